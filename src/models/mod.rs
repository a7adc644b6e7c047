pub mod coords;
pub mod experience;
pub mod location;
pub mod session;
pub mod trip;
pub mod user;
