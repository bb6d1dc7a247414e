pub mod ddl;
pub mod identifier;
pub mod sql;
