//! Wi-Fi station, broker socket and SNTP over embassy-net
//!
//! The radio and the IP stack run as background embassy tasks. The run loop
//! only sees them through [`StationLink`], [`TcpConnection`] and
//! [`sntp_query`].

use core::fmt::Write as _;
use core::net::Ipv4Addr;

use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{IpAddress, IpEndpoint, Ipv4Cidr, Runner, Stack, StaticConfigV4};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer, with_timeout};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent};
use log::{debug, info, warn};
use msgboard_core::config::StaticIpConfig;
use msgboard_core::link::{LinkError, RECONNECT_RETRY_DELAY_MS, WifiLink};
use msgboard_core::mqtt::Connection;
use msgboard_core::ntp::{self, NTP_PACKET_LEN, NTP_PORT, NtpError};
use thiserror_no_std::Error;

const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);
const SNTP_TIMEOUT: Duration = Duration::from_secs(3);

/// Set once by [`wifi_task`]: `true` if the radio started.
static WIFI_STARTED: Signal<CriticalSectionRawMutex, bool> = Signal::new();

#[derive(Debug, Error)]
pub enum NetError {
    #[error("No IPv4 configuration yet")]
    NoAddress,
    #[error("Host name did not resolve")]
    Resolve,
    #[error("Socket error")]
    Socket,
    #[error("Timed out")]
    Timeout,
    #[error("Bad time response: {0}")]
    Time(#[from] NtpError),
}

/// DHCP unless a valid static configuration is given.
pub fn ip_config(static_ip: Option<&StaticIpConfig<'_>>) -> embassy_net::Config {
    let Some(static_ip) = static_ip else {
        return embassy_net::Config::dhcpv4(Default::default());
    };
    let parsed = match static_ip.parse() {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Static IP ignored, using DHCP: {}", e);
            return embassy_net::Config::dhcpv4(Default::default());
        }
    };
    info!("Static IP {}/{}", parsed.address, parsed.prefix_len);

    let mut config = StaticConfigV4 {
        address: Ipv4Cidr::new(parsed.address, parsed.prefix_len),
        gateway: Some(parsed.gateway),
        dns_servers: Default::default(),
    };
    for server in parsed.dns_servers {
        if config.dns_servers.push(server).is_err() {
            warn!("Extra DNS server {} dropped", server);
        }
    }
    embassy_net::Config::ipv4_static(config)
}

#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

/// Starts the radio, then keeps the station associated for good.
#[embassy_executor::task]
pub async fn wifi_task(
    mut controller: WifiController<'static>,
    ssid: &'static str,
    password: &'static str,
) {
    let client_config = ModeConfig::Client(
        ClientConfig::default()
            .with_ssid(ssid.into())
            .with_password(password.into()),
    );
    if let Err(e) = controller.set_config(&client_config) {
        warn!("Wi-Fi config rejected: {:?}", e);
        WIFI_STARTED.signal(false);
        return;
    }
    if let Err(e) = controller.start_async().await {
        warn!("Wi-Fi start failed: {:?}", e);
        WIFI_STARTED.signal(false);
        return;
    }
    info!("Wi-Fi started");
    WIFI_STARTED.signal(true);

    loop {
        match controller.connect_async().await {
            Ok(_) => {
                info!("Wi-Fi associated with {}", ssid);
                controller.wait_for_event(WifiEvent::StaDisconnected).await;
                warn!("Wi-Fi disconnected; will retry");
            }
            Err(e) => warn!("Wi-Fi connect failed: {:?}", e),
        }
        Timer::after(Duration::from_millis(RECONNECT_RETRY_DELAY_MS as u64)).await;
    }
}

/// Association is considered done once DHCP has handed out an address.
pub struct StationLink {
    stack: Stack<'static>,
}

impl StationLink {
    pub fn new(stack: Stack<'static>) -> Self {
        Self { stack }
    }
}

impl WifiLink for StationLink {
    async fn begin(&mut self) -> Result<(), LinkError> {
        if WIFI_STARTED.wait().await {
            Ok(())
        } else {
            Err(LinkError::ConnectFailed)
        }
    }

    fn is_associated(&mut self) -> bool {
        self.stack.is_link_up() && self.stack.config_v4().is_some()
    }

    fn local_address(&self) -> heapless::String<40> {
        let mut text = heapless::String::new();
        if let Some(config) = self.stack.config_v4() {
            // 15 characters at most; always fits.
            let _ = write!(text, "{}", config.address.address());
        }
        text
    }
}

/// A literal dotted quad, or the first A record for `host`.
pub async fn resolve(stack: Stack<'_>, host: &str) -> Result<IpAddress, NetError> {
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Ok(IpAddress::Ipv4(addr));
    }
    let addrs = stack
        .dns_query(host, DnsQueryType::A)
        .await
        .map_err(|e| {
            debug!("DNS lookup for {} failed: {:?}", host, e);
            NetError::Resolve
        })?;
    addrs.first().copied().ok_or(NetError::Resolve)
}

/// Broker TCP stream.
pub struct TcpConnection<'a> {
    stack: Stack<'a>,
    socket: TcpSocket<'a>,
    host: &'a str,
    port: u16,
}

impl<'a> TcpConnection<'a> {
    pub fn new(
        stack: Stack<'a>,
        rx_buffer: &'a mut [u8],
        tx_buffer: &'a mut [u8],
        host: &'a str,
        port: u16,
    ) -> Self {
        Self {
            stack,
            socket: TcpSocket::new(stack, rx_buffer, tx_buffer),
            host,
            port,
        }
    }
}

impl Connection for TcpConnection<'_> {
    async fn open(&mut self) -> Result<(), LinkError> {
        self.socket.abort();
        let _ = self.socket.flush().await;
        self.socket.set_timeout(Some(SOCKET_TIMEOUT));

        if self.stack.config_v4().is_none() {
            return Err(LinkError::NotConnected);
        }
        let addr = resolve(self.stack, self.host)
            .await
            .map_err(|_| LinkError::ConnectFailed)?;

        info!("Opening broker socket to {}:{}", addr, self.port);
        self.socket
            .connect(IpEndpoint::new(addr, self.port))
            .await
            .map_err(|e| {
                warn!("Broker socket connect failed: {:?}", e);
                LinkError::ConnectFailed
            })
    }

    fn close(&mut self) {
        self.socket.close();
    }

    fn read_ready(&self) -> bool {
        // A closed receive half reads as end of stream straight away.
        self.socket.can_recv() || !self.socket.may_recv()
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        match with_timeout(SOCKET_TIMEOUT, self.socket.read(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => {
                debug!("Broker socket read: {:?}", e);
                Err(LinkError::ConnectionLost)
            }
            Err(_) => Err(LinkError::Timeout),
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<(), LinkError> {
        let mut rest = buf;
        while !rest.is_empty() {
            let n = with_timeout(SOCKET_TIMEOUT, self.socket.write(rest))
                .await
                .map_err(|_| LinkError::Timeout)?
                .map_err(|_| LinkError::ConnectionLost)?;
            if n == 0 {
                return Err(LinkError::ConnectionLost);
            }
            rest = &rest[n..];
        }
        with_timeout(SOCKET_TIMEOUT, self.socket.flush())
            .await
            .map_err(|_| LinkError::Timeout)?
            .map_err(|_| LinkError::ConnectionLost)
    }
}

/// Unix seconds from the first server in `servers` that answers.
pub async fn sntp_query(stack: Stack<'_>, servers: &[&str]) -> Result<u64, NetError> {
    if stack.config_v4().is_none() {
        return Err(NetError::NoAddress);
    }

    let mut last_error = NetError::Timeout;
    for server in servers {
        match query_server(stack, server).await {
            Ok(unix) => {
                info!("SNTP: time from {}", server);
                return Ok(unix);
            }
            Err(e) => {
                warn!("SNTP: {} failed: {}", server, e);
                last_error = e;
            }
        }
    }
    Err(last_error)
}

async fn query_server(stack: Stack<'_>, server: &str) -> Result<u64, NetError> {
    let addr = resolve(stack, server).await?;

    let mut rx_meta = [PacketMetadata::EMPTY; 1];
    let mut rx_buffer = [0u8; 128];
    let mut tx_meta = [PacketMetadata::EMPTY; 1];
    let mut tx_buffer = [0u8; 128];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );
    socket.bind(0).map_err(|_| NetError::Socket)?;

    let request = ntp::request_packet();
    socket
        .send_to(&request, IpEndpoint::new(addr, NTP_PORT))
        .await
        .map_err(|_| NetError::Socket)?;

    let mut response = [0u8; NTP_PACKET_LEN];
    let (len, _) = with_timeout(SNTP_TIMEOUT, socket.recv_from(&mut response))
        .await
        .map_err(|_| NetError::Timeout)?
        .map_err(|_| NetError::Socket)?;

    Ok(ntp::parse_response(&response[..len])?)
}
