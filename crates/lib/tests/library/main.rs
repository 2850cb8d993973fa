mod common;
mod pipeline_tests;
mod process_tests;
mod publish_tests;
