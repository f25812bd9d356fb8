pub mod background;
pub mod border;
pub mod bright_contrast;
pub mod calib;
pub mod chain;
pub mod error;
pub mod parameter;
pub mod swap;
pub mod traits;

pub use background::{BackgroundFilter, BackgroundModel, MixtureParams};
pub use border::BorderFilter;
pub use bright_contrast::BrightContrastFilter;
pub use calib::{CalibFilter, RemapTable};
pub use chain::FilterChain;
pub use error::FilterError;
pub use parameter::{ChangeNotifier, Parameter};
pub use swap::SwapFilter;
pub use traits::{Filter, FilterCore};
