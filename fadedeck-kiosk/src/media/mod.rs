mod channel;
mod decoder;

pub use channel::VideoChannel;
pub use decoder::{RENDER_HEIGHT, RENDER_WIDTH, RawFrame};
