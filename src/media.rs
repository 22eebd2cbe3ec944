pub(crate) mod decode;
pub(crate) mod encode;
pub(crate) mod ffmpeg;
pub(crate) mod probe;
