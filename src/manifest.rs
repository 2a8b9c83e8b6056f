pub mod columns;
pub mod validate;
