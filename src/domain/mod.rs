mod clock;
mod credentials;
mod farming;
mod pricing;
mod user;
mod validation;

pub use clock::*;
pub use credentials::*;
pub use farming::*;
pub use pricing::*;
pub use user::*;
pub use validation::*;
