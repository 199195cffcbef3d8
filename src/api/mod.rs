pub mod elevenlabs;
pub mod openai;
pub mod video;
