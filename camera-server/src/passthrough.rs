//! Registered passthrough commands.
//!
//! Commands without a dedicated handler are looked up here by name. Each entry
//! parses its own typed parameters and calls one [`SensorInterface`] method;
//! anything not registered is rejected.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use shared::camera_interface::{AecConfig, AgcConfig, SensorInterface};

use crate::error::{CommandError, CommandResult};

/// Largest flash read a client may request in one call
pub const MAX_FLASH_WORDS: usize = 1 << 16;

/// Handler bound to one passthrough command name.
pub type PassthroughHandler =
    fn(&mut dyn SensorInterface, &str, &Map<String, Value>) -> CommandResult<Value>;

#[derive(Deserialize)]
struct Enable {
    enable: bool,
}

#[derive(Deserialize)]
struct IntegrationTime {
    integration_time: u32,
}

#[derive(Deserialize)]
struct Address {
    address: u32,
}

#[derive(Deserialize)]
struct WriteRegisters {
    addresses: Vec<u32>,
    values: Vec<u32>,
}

#[derive(Deserialize)]
struct WriteDevice {
    address: u32,
    data: u32,
}

#[derive(Deserialize)]
struct ReadFlash {
    start_address: u32,
    number_of_words: usize,
}

/// Deserialize a parameter object into a typed struct.
pub fn parse_params<T: DeserializeOwned>(
    command: &str,
    params: &Map<String, Value>,
) -> CommandResult<T> {
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| CommandError::invalid_params(command, e))
}

pub struct PassthroughRegistry {
    handlers: BTreeMap<&'static str, PassthroughHandler>,
}

impl Default for PassthroughRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PassthroughRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Registry with every sensor configuration and register access command.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("set_integration_time", |sensor, cmd, params| {
            let p: IntegrationTime = parse_params(cmd, params)?;
            sensor.set_integration_time(p.integration_time)?;
            Ok(json!(true))
        });
        registry.register("read_fpga_register", |sensor, cmd, params| {
            let p: Address = parse_params(cmd, params)?;
            Ok(json!(sensor.read_fpga_register(p.address)?))
        });
        registry.register("write_fpga_registers", |sensor, cmd, params| {
            let p: WriteRegisters = parse_params(cmd, params)?;
            sensor.write_fpga_registers(&p.addresses, &p.values)?;
            Ok(json!(true))
        });
        registry.register("read_device", |sensor, cmd, params| {
            let p: Address = parse_params(cmd, params)?;
            Ok(json!(sensor.read_device(p.address)?))
        });
        registry.register("write_device", |sensor, cmd, params| {
            let p: WriteDevice = parse_params(cmd, params)?;
            sensor.write_device(p.address, p.data)?;
            Ok(json!(true))
        });
        registry.register("read_flash", |sensor, cmd, params| {
            let p: ReadFlash = parse_params(cmd, params)?;
            if p.number_of_words > MAX_FLASH_WORDS {
                return Err(CommandError::invalid_params(
                    cmd,
                    format!("number_of_words must be at most {MAX_FLASH_WORDS}"),
                ));
            }
            Ok(json!(sensor.read_flash(p.start_address, p.number_of_words)?))
        });
        registry.register("enable_nuc", |sensor, cmd, params| {
            sensor.enable_nuc(parse_params::<Enable>(cmd, params)?.enable)?;
            Ok(json!(true))
        });
        registry.register("enable_bpr", |sensor, cmd, params| {
            sensor.enable_bpr(parse_params::<Enable>(cmd, params)?.enable)?;
            Ok(json!(true))
        });
        registry.register("enable_aec", |sensor, cmd, params| {
            sensor.enable_aec(parse_params::<Enable>(cmd, params)?.enable)?;
            Ok(json!(true))
        });
        registry.register("enable_agc", |sensor, cmd, params| {
            sensor.enable_agc(parse_params::<Enable>(cmd, params)?.enable)?;
            Ok(json!(true))
        });
        registry.register("configure_aec", |sensor, cmd, params| {
            let config: AecConfig = parse_params(cmd, params)?;
            sensor.configure_aec(&config)?;
            Ok(json!(true))
        });
        registry.register("configure_agc", |sensor, cmd, params| {
            let config: AgcConfig = parse_params(cmd, params)?;
            sensor.configure_agc(&config)?;
            Ok(json!(true))
        });
        registry.register("set_column_sorting", |sensor, cmd, params| {
            sensor.set_column_sorting(parse_params::<Enable>(cmd, params)?.enable)?;
            Ok(json!(true))
        });
        registry.register("set_row_mirroring", |sensor, cmd, params| {
            sensor.set_row_mirroring(parse_params::<Enable>(cmd, params)?.enable)?;
            Ok(json!(true))
        });
        registry
    }

    pub fn register(&mut self, name: &'static str, handler: PassthroughHandler) {
        self.handlers.insert(name, handler);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    pub fn call(
        &self,
        sensor: &mut dyn SensorInterface,
        command: &str,
        params: &Map<String, Value>,
    ) -> CommandResult<Value> {
        let handler = self
            .handlers
            .get(command)
            .ok_or_else(|| CommandError::UnknownCommand {
                command: command.to_string(),
                available: self.names().map(str::to_string).collect(),
            })?;
        handler(sensor, command, params)
    }
}
