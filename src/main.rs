//! Console firmware entry point.
//!
//! 1. Install the console logger
//! 2. Load console knobs (NVS on target)
//! 3. Start the serial console session
//! 4. Start the Telnet server
//! 5. Park the main task; sessions run in their own tasks

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn, LevelFilter};

use rust_vehicle_console::config::{nvs, ConsoleConfig};
use rust_vehicle_console::console::CommandRegistry;
use rust_vehicle_console::engine::{ConsoleServices, ConsoleSession};
use rust_vehicle_console::logging::{ConsoleLogger, LogRouter};
use rust_vehicle_console::task::{self, Parent};
use rust_vehicle_console::transport::telnet::TelnetServer;
use rust_vehicle_console::transport::{serial, Transport};

fn main() {
    #[cfg(target_os = "espidf")]
    esp_idf_svc::sys::link_patches();

    let router = LogRouter::new();
    let logger = ConsoleLogger::new(router.clone());
    #[cfg(target_os = "espidf")]
    let logger = logger.with_fallback(Box::new(esp_idf_svc::log::EspLogger::new()));
    if logger.init(LevelFilter::Info).is_err() {
        return;
    }

    let mut config = ConsoleConfig::default();
    match nvs::load_console_config(&mut config) {
        Ok(true) => info!("Console config loaded from NVS"),
        Ok(false) => {
            info!("Console config: defaults");
            if let Err(e) = nvs::save_console_config(&config) {
                warn!("Console config not saved: {}", e);
            }
        }
        Err(e) => warn!("Console config: {}, using defaults", e),
    }

    let services = ConsoleServices::new(CommandRegistry::with_builtins(), router, config);

    start_serial(&services);

    let servers = Parent::new();
    if let Err(e) = servers.add_child(Arc::new(TelnetServer::new(services.config.telnet_port, services.clone()))) {
        error!("{}", e);
    }

    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}

fn spawn_session<T: Transport>(transport: T, services: &ConsoleServices) {
    if let Err(e) = task::spawn(Arc::new(ConsoleSession::new(transport, services))) {
        error!("Serial console: {}", e);
    }
}

#[cfg(not(target_os = "espidf"))]
fn start_serial(services: &ConsoleServices) {
    spawn_session(serial::stdio(services.config.receiver_task), services);
}

#[cfg(target_os = "espidf")]
fn start_serial(services: &ConsoleServices) {
    use esp_idf_svc::hal::gpio::AnyIOPin;
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::hal::uart::{config::Config, UartDriver};

    let peripherals = match Peripherals::take() {
        Ok(p) => p,
        Err(e) => {
            error!("Peripherals: {}", e);
            return;
        }
    };
    let uart = UartDriver::new(
        peripherals.uart0,
        peripherals.pins.gpio1,
        peripherals.pins.gpio3,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &Config::default(),
    );
    match uart {
        Ok(uart) => spawn_session(serial::uart_console(uart, services.config.receiver_task), services),
        Err(e) => error!("UART0: {}", e),
    }
}
