//! Bakes credentials into the binary.
//!
//! Values come from the process environment or a `.env` file next to the
//! workspace root. Missing keys become empty strings so the firmware still
//! builds; it then fails to associate and shows that on screen.

const KEYS: [&str; 7] = [
    "MSGBOARD_WIFI_SSID",
    "MSGBOARD_WIFI_PASSWORD",
    "MSGBOARD_BROKER_HOST",
    "MSGBOARD_STATIC_IP",
    "MSGBOARD_GATEWAY",
    "MSGBOARD_SUBNET_MASK",
    "MSGBOARD_DNS_SERVERS",
];

fn main() {
    println!("cargo:rerun-if-changed=.env");
    println!("cargo:rerun-if-changed=../../.env");

    if dotenvy::dotenv().is_err() {
        println!("cargo:warning=no .env file found, using the build environment only");
    }

    for key in KEYS {
        println!("cargo:rerun-if-env-changed={key}");
        let value = std::env::var(key).unwrap_or_default();
        println!("cargo:rustc-env={key}={value}");
    }

    println!("cargo:rustc-link-arg=-Tlinkall.x");
}
