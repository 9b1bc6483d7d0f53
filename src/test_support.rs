use std::net::TcpListener;
use std::path::Path;

use serde_json::Value;

pub fn unused_local_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{}/token", port)
}

pub fn write_json(path: &Path, value: &Value) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture dir");
    }
    let data = serde_json::to_vec_pretty(value).expect("encode fixture");
    std::fs::write(path, data).expect("write fixture");
}

pub fn read_json(path: &Path) -> Value {
    let data = std::fs::read(path).expect("read fixture");
    serde_json::from_slice(&data).expect("parse fixture")
}
