pub mod doctor;
pub mod notification;
pub mod record;

pub use doctor::*;
pub use notification::*;
pub use record::*;
