pub mod about;
pub mod aligner;
pub mod alignment;
pub mod annotation;
pub mod config;
pub mod error;
pub mod external;
pub mod feature_location;
pub mod genome;
pub mod kmers;
pub mod nucleotide;
pub mod pipeline;
pub mod primer;
pub mod primer3;
pub mod product;
pub mod ranking;
pub mod report;
pub mod scoring;
pub mod tool_overrides;
