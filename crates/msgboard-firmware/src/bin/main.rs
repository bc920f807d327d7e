#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::StackResources;
use embassy_time::{Delay, Duration, Instant, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use log::{error, info, warn};
use static_cell::StaticCell;

// Display-LCD panel specific imports
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use mipidsi::interface::SpiInterface;
use mipidsi::{Builder as MipidsiBuilder, models::ILI9342CRgb565};

use msgboard_core::app_state::AppRunState;
use msgboard_core::config::{BrokerConfig, Config, InternetConfig, StaticIpConfig};
use msgboard_core::mqtt::MqttClient;
use msgboard_core::ntp::NtpClock;
use msgboard_core::runtime::DeviceRuntime;
use msgboard_core::{DISPLAY_HEIGHT_PX, DISPLAY_WIDTH_PX};
use msgboard_firmware::hardware::{self, HardwareError};
use msgboard_firmware::net::{self, StationLink, TcpConnection};
use msgboard_firmware::panel::Panel;
use msgboard_firmware::secrets;
use msgboard_firmware::touch::TouchButtons;

/// Pause between run loop iterations.
const LOOP_PERIOD: Duration = Duration::from_millis(20);
/// Minimum gap between failed time sync attempts.
const SYNC_RETRY_MS: u64 = 60_000;
const RESTART_DELAY_MS: u32 = 5_000;
const MQTT_BUFFER_LEN: usize = 2048;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
esp_bootloader_esp_idf::esp_app_desc!();

/// Log `reason` and restart the chip.
fn restart(reason: &dyn core::fmt::Display) -> ! {
    error!("{}; restarting", reason);
    esp_hal::delay::Delay::new().delay_millis(RESTART_DELAY_MS);
    esp_hal::system::software_reset()
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(log::LevelFilter::Info);

    let esp_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(esp_config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);
    // The frame buffer alone is larger than internal RAM allows.
    esp_alloc::psram_allocator!(peripherals.PSRAM, esp_hal::psram);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);
    info!("Embassy initialized");

    // Power rails first; the panel and touch controller hang off them.
    let i2c0 = match hardware::create_i2c_bus(
        peripherals.I2C0,
        peripherals.GPIO12,
        peripherals.GPIO11,
    ) {
        Ok(bus) => bus,
        Err(e) => restart(&e),
    };
    let (_board_power, touch_i2c) = hardware::init_board(i2c0).await;

    let spi_bus = match Spi::new(peripherals.SPI2, SpiConfig::default()) {
        Ok(spi) => spi
            .with_sck(peripherals.GPIO36)
            .with_mosi(peripherals.GPIO37),
        Err(_) => restart(&HardwareError::SpiConfig),
    };
    let cs = Output::new(peripherals.GPIO35, Level::High, OutputConfig::default());
    let Ok(spi_device) = ExclusiveDevice::new_no_delay(spi_bus, cs);
    let dc = Output::new(peripherals.GPIO34, Level::Low, OutputConfig::default());

    static SPI_BUFFER: StaticCell<[u8; 512]> = StaticCell::new();
    let di = SpiInterface::new(spi_device, dc, SPI_BUFFER.init([0; 512]));

    let display = match MipidsiBuilder::new(ILI9342CRgb565, di)
        .display_size(DISPLAY_WIDTH_PX, DISPLAY_HEIGHT_PX)
        .init(&mut Delay)
    {
        Ok(display) => display,
        Err(e) => {
            error!("Display init: {:?}", e);
            restart(&HardwareError::Display)
        }
    };
    info!("Display initialized");

    // Radio and IP stack run as background tasks from here on.
    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio = match esp_radio::init() {
        Ok(radio) => RADIO.init(radio),
        Err(e) => {
            error!("Radio init: {:?}", e);
            restart(&"radio unavailable")
        }
    };
    let (wifi_controller, interfaces) =
        match esp_radio::wifi::new(radio, peripherals.WIFI, Default::default()) {
            Ok(parts) => parts,
            Err(e) => {
                error!("Wi-Fi init: {:?}", e);
                restart(&"Wi-Fi unavailable")
            }
        };

    let mut broker = BrokerConfig::default();
    if !secrets::BROKER_HOST.is_empty() {
        broker.host = secrets::BROKER_HOST;
    }
    let static_ip = (!secrets::STATIC_IP.is_empty()).then(|| StaticIpConfig {
        address: secrets::STATIC_IP,
        gateway: secrets::GATEWAY,
        subnet_mask: secrets::SUBNET_MASK,
        dns_servers: secrets::DNS_SERVERS
            .split(',')
            .map(str::trim)
            .filter(|server| !server.is_empty())
            .collect(),
    });
    let config = Config {
        internet: InternetConfig {
            ssid: secrets::WIFI_SSID,
            password: secrets::WIFI_PASSWORD,
            static_ip,
        },
        broker,
        ..Config::default()
    };

    let rng = Rng::new();
    let net_seed = (rng.random() as u64) << 32 | rng.random() as u64;
    static STACK_RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        net::ip_config(config.internet.static_ip.as_ref()),
        STACK_RESOURCES.init(StackResources::new()),
        net_seed,
    );
    spawner.spawn(net::net_task(runner)).ok();
    spawner
        .spawn(net::wifi_task(
            wifi_controller,
            secrets::WIFI_SSID,
            secrets::WIFI_PASSWORD,
        ))
        .ok();

    static MQTT_RX: StaticCell<[u8; MQTT_BUFFER_LEN]> = StaticCell::new();
    static MQTT_TX: StaticCell<[u8; MQTT_BUFFER_LEN]> = StaticCell::new();
    let connection = TcpConnection::new(
        stack,
        MQTT_RX.init([0; MQTT_BUFFER_LEN]),
        MQTT_TX.init([0; MQTT_BUFFER_LEN]),
        config.broker.host,
        config.broker.port,
    );

    let mut runtime = DeviceRuntime::new(
        &config,
        Panel::new(display),
        MqttClient::new(connection, config.broker.keep_alive_secs),
        NtpClock::new(config.time.utc_offset_secs),
        TouchButtons::new(touch_i2c),
        Delay,
        rng.random(),
    );

    let mut wifi = StationLink::new(stack);
    if let Err(e) = runtime.associate(&mut wifi, config.internet.ssid).await {
        restart(&e);
    }

    let mut last_sync_attempt: Option<u64> = None;
    loop {
        let now_ms = Instant::now().as_millis();

        let sync_due = runtime.time_mut().needs_resync(now_ms)
            && last_sync_attempt.is_none_or(|at| now_ms.saturating_sub(at) >= SYNC_RETRY_MS);
        if sync_due {
            last_sync_attempt = Some(now_ms);
            let first_sync = !runtime.time_mut().is_synced();
            if first_sync {
                runtime.set_run_state(AppRunState::TimeSyncing);
            }
            match net::sntp_query(stack, &config.time.ntp_servers).await {
                Ok(unix_secs) => {
                    runtime
                        .time_mut()
                        .sync(unix_secs, Instant::now().as_millis());
                    if first_sync {
                        runtime.set_run_state(AppRunState::TimeKnown);
                    }
                }
                Err(e) => warn!("Time sync failed: {}", e),
            }
        }

        runtime.step(now_ms).await;
        Timer::after(LOOP_PERIOD).await;
    }
}
