pub mod gemini;
pub mod ollama;
pub mod openai;

pub use gemini::Gemini;
pub use ollama::Ollama;
pub use openai::OpenAi;
