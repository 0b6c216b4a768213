
pub mod compare;
pub mod project;
pub mod schema;
pub mod fix_header;
