pub mod frame;
pub mod gate;

pub use frame::{Frame, FrameInfo, RawFrame};
pub use gate::{FrameGate, GateConfig};
