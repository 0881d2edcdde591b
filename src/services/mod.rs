pub mod filing_service;
pub mod llm_service;
pub mod prompt_service;
pub mod response_parser;
pub mod scan_service;
pub mod undo_service;
