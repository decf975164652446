pub mod extractor;
pub mod identifiers;
pub mod jwt;
pub mod scope;
pub mod test_utils;
