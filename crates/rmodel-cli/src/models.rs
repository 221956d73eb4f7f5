//! Schemas driven by the CLI.

use std::sync::LazyLock;

use rmodel::{Schema, ValueType};

/// The record timed by `bench`: six scalars and one hash.
pub static BUILDING: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder("Building")
        .prefix("tbuilding")
        .scalar("profit", ValueType::Int)
        .scalar("build_total", ValueType::Int)
        .scalar("build_one", ValueType::Int)
        .scalar("lock", ValueType::Bool)
        .scalar("public", ValueType::Bool)
        .scalar("id", ValueType::Int)
        .hash_with_default("flash", ValueType::Int, 0)
        .build()
});

pub static ITEM: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder("Item")
        .scalar("id", ValueType::Int)
        .scalar("total", ValueType::Int)
        .hash_with_default("hash", ValueType::Int, 0)
        .list("log", ValueType::Str)
        .build()
});

pub static STORE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::builder("Store")
        .prefix("store")
        .assign(&ITEM)
        .scalar_with_default("name", ValueType::Str, "default_name")
        .build()
});
