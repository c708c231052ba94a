//! Adapters: concrete implementations behind the application ports.
//!
//! | Adapter      | Implements   | Connects to                   |
//! |--------------|--------------|-------------------------------|
//! | `cert_store` | CertBundle   | NVS `certs` namespace / memory|
//! | `log_sink`   | EventSink    | Serial log output             |
//! | `tcp_server` | Transport    | TCP listener, TLS on device   |
//! | `wifi`       | network join | ESP-IDF WiFi STA              |

pub mod cert_store;
pub mod log_sink;
pub mod tcp_server;
pub mod wifi;
