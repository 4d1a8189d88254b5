pub mod player;
pub mod protocol;
pub mod role;
pub mod room;
pub mod session;
pub mod win;
