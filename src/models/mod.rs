pub mod doctor;
pub mod media;

pub use doctor::*;
pub use media::*;
