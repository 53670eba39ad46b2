pub mod analysis_model;
