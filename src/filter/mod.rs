pub mod error;
pub mod params;
pub mod resolver;
pub mod types;

pub use error::ParamError;
pub use params::{FilterRequest, QueryParams};
pub use resolver::{medtronic_loop_boundary, resolve, MEDTRONIC_LOOP_BOUNDARY};
pub use types::{DexcomDataSource, Filter};
