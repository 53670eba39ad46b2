pub mod analysis_state;
