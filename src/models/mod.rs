pub mod error;
pub mod events;
pub mod flashcard;
pub mod health;

pub use error::*;
pub use events::*;
pub use flashcard::*;
pub use health::*;
