pub mod analysis_handler;
