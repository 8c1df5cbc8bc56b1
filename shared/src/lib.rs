pub mod level;
pub mod record;
pub mod score;
pub mod territory;

pub use level::Level;
pub use record::*;
pub use score::*;
pub use territory::*;
