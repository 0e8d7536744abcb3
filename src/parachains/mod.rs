pub mod moonbase;
