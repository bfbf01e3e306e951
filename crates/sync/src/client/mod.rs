mod session;

pub use session::{ClientSession, FrameReport, SessionStats};
