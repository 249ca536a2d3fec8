pub mod tests_module_source;
pub mod tests_skipped_entities;
pub mod tests_template_entry_points;
