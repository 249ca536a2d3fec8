pub mod tests_batch;
pub mod tests_invocation;
