//! Process-wide table of driver constructors, keyed by engine name.
//!
//! The built-in drivers are present from first access. Further drivers can be
//! added at runtime with [`register`]; registering an existing name replaces
//! its constructor.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use log::{debug, info};
use parking_lot::RwLock;

use crate::driver::local::LocalDriver;
use crate::driver::{Driver, DriverConfig};
use crate::error::{FtsError, Result};
use crate::index::Profile;

/// Builds a driver from its configuration.
pub type DriverFactory = Arc<dyn Fn(DriverConfig) -> Result<Box<dyn Driver>> + Send + Sync>;

/// Wrap a typed constructor as a [`DriverFactory`].
pub fn factory<D, F>(make: F) -> DriverFactory
where
    D: Driver + 'static,
    F: Fn(DriverConfig) -> Result<D> + Send + Sync + 'static,
{
    Arc::new(move |config: DriverConfig| -> Result<Box<dyn Driver>> { Ok(Box::new(make(config)?)) })
}

fn builtin() -> HashMap<String, DriverFactory> {
    let mut table: HashMap<String, DriverFactory> = HashMap::new();
    for profile in Profile::ALL {
        table.insert(
            LocalDriver::driver_name(profile).to_string(),
            factory(move |config| LocalDriver::open(profile, config)),
        );
    }

    #[cfg(feature = "external")]
    {
        use crate::driver::external::{ManticoreDriver, MeiliSearchDriver, PostgresDriver};

        table.insert(ManticoreDriver::NAME.to_string(), factory(ManticoreDriver::new));
        table.insert(MeiliSearchDriver::NAME.to_string(), factory(MeiliSearchDriver::new));
        table.insert(PostgresDriver::NAME.to_string(), factory(PostgresDriver::new));
    }
    table
}

lazy_static! {
    static ref REGISTRY: RwLock<HashMap<String, DriverFactory>> = RwLock::new(builtin());
}

/// Add or replace the constructor for `name`.
pub fn register<S: Into<String>>(name: S, factory: DriverFactory) {
    let name = name.into();
    info!("Registering driver {name}");
    REGISTRY.write().insert(name, factory);
}

pub fn get(name: &str) -> Option<DriverFactory> {
    REGISTRY.read().get(name).cloned()
}

/// Registered driver names, sorted.
pub fn list() -> Vec<String> {
    let mut names: Vec<String> = REGISTRY.read().keys().cloned().collect();
    names.sort();
    names
}

/// Construct the driver named by `config.engine`.
pub fn open(config: DriverConfig) -> Result<Box<dyn Driver>> {
    let factory = get(&config.engine).ok_or_else(|| FtsError::UnknownDriver(config.engine.clone()))?;
    debug!("Opening driver {}", config.engine);
    factory(config)
}
