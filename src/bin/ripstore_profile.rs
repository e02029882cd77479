//! Drives a table through a representative insert/update/select/merge
//! workload and reports elapsed time per phase. Not part of the library's
//! public contract; a standalone knob for manually sanity-checking
//! performance after changes to the buffer pool or merge path.

use std::env;
use std::time::Instant;

use ripstore::config::Config;
use ripstore::database::Database;

fn main() {
    env_logger::init();

    let mut args = env::args().skip(1);
    let num_rows: i64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(1000);
    let num_updates: i64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(num_rows * 2);

    let dir = std::env::temp_dir().join(format!("ripstore_profile_{}", std::process::id()));
    let mut db = Database::with_config(&dir, Config::default()).expect("open database");
    let table = db
        .create_table("profile", 5, 0)
        .expect("create table");

    let start = Instant::now();
    for i in 0..num_rows {
        table.insert(vec![i, i, i, i, i]);
    }
    println!("insert {} rows: {:?}", num_rows, start.elapsed());

    let start = Instant::now();
    for i in 0..num_updates {
        let key = i % num_rows;
        table.update(key, vec![None, None, Some(i), None, None]);
    }
    println!("apply {} updates: {:?}", num_updates, start.elapsed());

    let start = Instant::now();
    for i in 0..num_rows {
        let _ = table.select(i, vec![true; 5]);
    }
    println!("select {} rows: {:?}", num_rows, start.elapsed());

    let start = Instant::now();
    table.merge(&table.all_tail_pages()).expect("merge");
    println!("merge: {:?}", start.elapsed());

    db.close().expect("close database");
    let _ = std::fs::remove_dir_all(&dir);
}
