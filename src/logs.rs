//! Tiny leveled console logger for the control plane, matching the
//! teacher's `println!`/`eprintln!` idiom rather than pulling in `tracing`
//! at the root (the proxy crate, which actually runs hundreds of
//! concurrent connections, is where `tracing` earns its keep).

fn timestamp() -> String {
    chrono::Utc::now().format("%H:%M:%S").to_string()
}

pub fn info(msg: &str) {
    println!("[{}] INFO  {msg}", timestamp());
}

pub fn warn(msg: &str) {
    println!("[{}] WARN  {msg}", timestamp());
}

pub fn error(msg: &str) {
    eprintln!("[{}] ERROR {msg}", timestamp());
}
