//! Core-pinned task spawning for the ESP32-S3.
//!
//! ESP-IDF implements `std::thread` on top of pthreads, which in turn are
//! FreeRTOS tasks.  `esp_pthread_set_cfg()` sets a thread-local template
//! that applies to the *next* `pthread_create()` from the calling thread,
//! so configure-then-spawn must not interleave with other thread creation
//! on the same thread.  On non-ESP targets the core and priority are
//! ignored.

use std::io;
use std::thread::JoinHandle;

#[cfg(not(target_os = "espidf"))]
const HOST_MIN_STACK: usize = 256 * 1024;

/// CPU cores of the ESP32-S3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU): WiFi and lwIP live here.
    Pro = 0,
    /// Core 1 (APP_CPU).
    App = 1,
}

/// Placement and sizing of one firmware task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
    /// NUL-terminated task name, e.g. `"tcp-io\0"`.
    pub name: &'static str,
}

impl TaskSpec {
    /// Task name without the trailing NUL.
    pub fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }

    /// Spawn `f` as a thread placed according to this spec.
    #[cfg(target_os = "espidf")]
    pub fn spawn(self, f: impl FnOnce() + Send + 'static) -> io::Result<JoinHandle<()>> {
        // SAFETY: the config struct is fully initialised by the IDF default
        // and `name` is a NUL-terminated 'static string.
        unsafe {
            let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
            cfg.pin_to_core = self.core as i32;
            cfg.prio = i32::from(self.priority);
            cfg.stack_size = (self.stack_kb * 1024) as i32;
            cfg.thread_name = self.name.as_ptr().cast();
            let ret = esp_idf_sys::esp_pthread_set_cfg(&cfg);
            if ret != esp_idf_sys::ESP_OK as i32 {
                return Err(io::Error::other(format!(
                    "esp_pthread_set_cfg failed: {ret}"
                )));
            }
        }

        log::info!(
            "Spawning '{}' on {:?} (pri={}, stack={}KB)",
            self.display_name(),
            self.core,
            self.priority,
            self.stack_kb
        );

        std::thread::Builder::new()
            .name(self.display_name().into())
            .spawn(f)
    }

    /// Simulation fallback: no core pinning or priority.  Host code paths
    /// (std I/O, formatting) need more stack than the device budget.
    #[cfg(not(target_os = "espidf"))]
    pub fn spawn(self, f: impl FnOnce() + Send + 'static) -> io::Result<JoinHandle<()>> {
        log::info!(
            "Spawning '{}' (sim, stack={}KB)",
            self.display_name(),
            self.stack_kb
        );

        std::thread::Builder::new()
            .name(self.display_name().into())
            .stack_size((self.stack_kb * 1024).max(HOST_MIN_STACK))
            .spawn(f)
    }
}
