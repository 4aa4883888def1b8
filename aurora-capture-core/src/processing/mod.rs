pub mod converter;
pub mod encoder;
pub mod mixdown;
pub mod wav_format;
