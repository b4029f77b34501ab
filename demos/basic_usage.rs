//! Basic bridge usage example
//!
//! This example demonstrates the client call pattern over the SQLite transport:
//! - Connecting
//! - Creating tables and inserting data
//! - Reading results in buffered and streaming mode
//! - Inspecting field descriptors
//! - Reading errors
//!
//! Run with: cargo run --example basic_usage

use rust_sql_bridge::prelude::*;
use std::sync::Arc;

fn main() -> Result<()> {
    println!("=== Rust SQL Bridge - Basic Usage Example ===\n");

    let mut conn = Connection::init(Arc::new(SqliteTransport::new()));

    println!("1. Connecting...");
    conn.connect(Some("localhost"), Some("demo"), None, Some("demo"), 3306, None, 0)?;
    println!(
        "   ✓ Connected to {} ({})\n",
        conn.server_info().unwrap_or_default(),
        conn.host_info().unwrap_or_default()
    );

    println!("2. Creating table...");
    conn.query(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            username VARCHAR(20) NOT NULL,
            email TEXT,
            balance REAL
        )",
    )?;
    println!("   ✓ Table created\n");

    println!("3. Inserting data...");
    conn.query(
        "INSERT INTO users (username, email, balance) VALUES
            ('alice', 'alice@example.com', 1500.5),
            ('bob', NULL, 2300.75),
            ('charlie', 'charlie@example.com', 980.25)",
    )?;
    println!("   ✓ {} rows inserted\n", conn.affected_rows());

    println!("4. Buffered read...");
    conn.query("SELECT id, username, email, balance FROM users ORDER BY id")?;
    if let Some(mut result) = conn.store_result()? {
        for field in result.fetch_fields() {
            println!("   field {:<10} length {:>5}", field.name, field.length);
        }
        println!("   {} rows", result.num_rows());
        while let Some(row) = result.fetch_row() {
            let values: Vec<String> = row
                .to_strings()
                .into_iter()
                .map(|v| v.unwrap_or_else(|| "NULL".to_string()))
                .collect();
            println!("   {}", values.join(" | "));
        }
    }
    println!();

    println!("5. Streaming read...");
    conn.query("SELECT username FROM users WHERE balance > 1000")?;
    if let Some(mut result) = conn.use_result()? {
        while let Some(row) = result.fetch_row() {
            println!("   {}", row.get_str(0).unwrap_or("NULL"));
        }
        println!("   {} rows streamed", result.num_rows());
    }
    println!();

    println!("6. Error reporting...");
    if conn.query("SELECT * FROM missing_table").is_err() {
        println!("   error {}: {}", conn.errno(), conn.error());
    }
    println!();

    conn.close();
    println!("=== Example completed successfully ===");
    Ok(())
}
