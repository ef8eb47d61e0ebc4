// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Runtime configuration.

/// A display mode: resolution plus color depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
}

impl DisplayMode {
    pub const fn new(width: u32, height: u32, bits_per_pixel: u32) -> Self {
        DisplayMode { width, height, bits_per_pixel }
    }
}

impl Default for DisplayMode {
    fn default() -> Self {
        DisplayMode::new(640, 480, 32)
    }
}

/**
Settings fixed for the life of a [`Runtime`](crate::Runtime).

```
use surfaces_and_scenes::{Config, DisplayMode};
let config = Config::default()
    .with_single_back_buffer(true)
    .with_default_display_mode(DisplayMode::new(800, 600, 16));
assert!(config.single_back_buffer());
```
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    single_back_buffer: bool,
    force_device_lock: bool,
    execute_buffer_adapter: bool,
    max_back_buffers: u32,
    default_display_mode: DisplayMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            single_back_buffer: false,
            force_device_lock: false,
            execute_buffer_adapter: true,
            max_back_buffers: 3,
            default_display_mode: DisplayMode::default(),
        }
    }
}

impl Config {
    /// Map every flip chain member onto backend slot 0.
    pub fn with_single_back_buffer(mut self, single: bool) -> Self {
        self.single_back_buffer = single;
        self
    }

    /// Take the device lock on every device, not only those created thread-safe.
    pub fn with_force_device_lock(mut self, force: bool) -> Self {
        self.force_device_lock = force;
        self
    }

    /// Allow newer devices to be queried for the execute-buffer generations.
    pub fn with_execute_buffer_adapter(mut self, enabled: bool) -> Self {
        self.execute_buffer_adapter = enabled;
        self
    }

    pub fn with_max_back_buffers(mut self, max: u32) -> Self {
        self.max_back_buffers = max;
        self
    }

    pub fn with_default_display_mode(mut self, mode: DisplayMode) -> Self {
        self.default_display_mode = mode;
        self
    }

    pub fn single_back_buffer(&self) -> bool {
        self.single_back_buffer
    }
    pub fn force_device_lock(&self) -> bool {
        self.force_device_lock
    }
    pub fn execute_buffer_adapter(&self) -> bool {
        self.execute_buffer_adapter
    }
    pub fn max_back_buffers(&self) -> u32 {
        self.max_back_buffers
    }
    pub fn default_display_mode(&self) -> DisplayMode {
        self.default_display_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(!config.single_back_buffer());
        assert!(!config.force_device_lock());
        assert!(config.execute_buffer_adapter());
        assert_eq!(config.max_back_buffers(), 3);
        assert_eq!(config.default_display_mode(), DisplayMode::new(640, 480, 32));
    }

    #[test]
    fn builders_chain() {
        let config = Config::default().with_force_device_lock(true).with_execute_buffer_adapter(false).with_max_back_buffers(1);
        assert!(config.force_device_lock());
        assert!(!config.execute_buffer_adapter());
        assert_eq!(config.max_back_buffers(), 1);
    }
}
