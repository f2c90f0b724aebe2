/// runnable demonstrations of the tabulation cache
pub mod tabulation_examples;
