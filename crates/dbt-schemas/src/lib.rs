pub mod schemas {
    pub mod macros;
    pub mod nodes;
    pub mod profiles;
    pub mod serde;
}
