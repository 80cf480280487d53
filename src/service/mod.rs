pub mod action_interpreter;
pub mod llm_service;
pub mod prompt_composer;
