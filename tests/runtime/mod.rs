pub mod tests_bound_class;
pub mod tests_dispatch;
