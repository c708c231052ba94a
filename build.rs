use std::env;
use std::fs;
use std::path::PathBuf;

/// Env var naming a PEM file, and the name it is embedded under in `OUT_DIR`.
const EMBEDDED_PEM: [(&str, &str); 3] = [
    ("REGSERVER_SERVER_CERT", "server_cert.pem"),
    ("REGSERVER_SERVER_KEY", "server_key.pem"),
    ("REGSERVER_CA_CERT", "ca_cert.pem"),
];

fn main() {
    println!("cargo:rerun-if-env-changed=REGSERVER_CONFIG_JSON");
    println!("cargo:rerun-if-env-changed=WIFI_SSID");
    println!("cargo:rerun-if-env-changed=WIFI_PASSWORD");

    // Factory TLS identity, used when the `certs` NVS namespace is empty.
    // Unset variables embed an empty file.
    let out = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    for (var, file) in EMBEDDED_PEM {
        println!("cargo:rerun-if-env-changed={var}");
        let pem = match env::var(var) {
            Ok(path) if !path.is_empty() => {
                println!("cargo:rerun-if-changed={path}");
                fs::read(&path).unwrap_or_else(|e| panic!("{var}={path}: {e}"))
            }
            _ => Vec::new(),
        };
        fs::write(out.join(file), pem).unwrap();
    }

    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
