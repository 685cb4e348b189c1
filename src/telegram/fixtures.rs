// Test telegrams modelled on real meter captures

use super::checksum::crc16_arc;
use super::raw::Telegram;

/// DSMR 4 Iskra MT382: header through last data line, no end marker
pub const ISKRA_LINES: &[&str] = &[
    "/ISk5\\2MT382-1000",
    "",
    "1-3:0.2.8(50)",
    "0-0:1.0.0(231015120000S)",
    "0-0:96.1.1(4B384547303034303436333935353037)",
    "1-0:1.8.1(000123.456*kWh)",
    "1-0:1.8.2(000456.789*kWh)",
    "1-0:2.8.1(000012.345*kWh)",
    "1-0:2.8.2(000067.890*kWh)",
    "0-0:96.14.0(0002)",
    "1-0:1.7.0(01.193*kW)",
    "1-0:2.7.0(00.000*kW)",
    "0-0:96.7.21(00004)",
    "1-0:32.7.0(230.1*V)",
    "1-0:52.7.0(229.8*V)",
    "1-0:72.7.0(231.0*V)",
    "1-0:31.7.0(001*A)",
    "0-1:24.2.1(231015120000S)(01234.567*m3)",
];

/// Kaifa MA105, fixed-column layout
pub const KAIFA_LINES: &[&str] = &[
    "/KFM5KAIFA-METER",
    "",
    "1-3:0.2.8(42)",
    "0-0:1.0.0(240115083000W)",
    "0-0:96.1.1(4530303235303030303639373432313135)",
    "1-0:1.8.1(001581.123*kWh)",
    "1-0:1.8.2(001474.456*kWh)",
    "1-0:2.8.1(000000.000*kWh)",
    "1-0:2.8.2(000000.000*kWh)",
    "0-0:96.14.0(0001)",
    "1-0:1.7.0(00.345*kW)",
    "1-0:2.7.0(00.000*kW)",
    "0-0:96.7.21(00002)",
    "0-1:24.1.0(003)",
    "0-1:96.1.0(4730303139333430323231363035313135)",
    "0-1:24.2.1(240115080000W)(02345.678*m3)",
];

/// Landis+Gyr E350 (DSMR 4.2), variable-width values
pub const LANDIS_LINES: &[&str] = &[
    "/XMX5LGBBFG1009021021",
    "",
    "1-3:0.2.8(42)",
    "0-0:1.0.0(170108161107W)",
    "1-0:1.8.1(001234.001*kWh)",
    "1-0:1.8.2(002345.002*kWh)",
    "1-0:2.8.1(000100.100*kWh)",
    "1-0:1.7.0(0.555*kW)",
    "1-0:32.7.0(00228.0*V)",
    "1-0:31.7.0(002*A)",
    "0-1:24.2.1(170108160000W)(00002.345*m3)",
];

/// DSMR 5.0 Iskra capture exactly as received, with the CRC the
/// meter sent (from the dsmr_parser test suite)
pub const DSMR5_CAPTURE: &[&str] = &[
    "/ISk5\\2MT382-1000",
    "",
    "1-3:0.2.8(50)",
    "0-0:1.0.0(170102192002W)",
    "0-0:96.1.1(4B384547303034303436333935353037)",
    "1-0:1.8.1(000004.426*kWh)",
    "1-0:1.8.2(000002.399*kWh)",
    "1-0:2.8.1(000002.444*kWh)",
    "1-0:2.8.2(000000.000*kWh)",
    "0-0:96.14.0(0002)",
    "1-0:1.7.0(00.244*kW)",
    "1-0:2.7.0(00.000*kW)",
    "0-0:96.7.21(00013)",
    "0-0:96.7.9(00000)",
    "1-0:99.97.0(0)(0-0:96.7.19)",
    "1-0:32.32.0(00000)",
    "1-0:52.32.0(00000)",
    "1-0:72.32.0(00000)",
    "1-0:32.36.0(00000)",
    "1-0:52.36.0(00000)",
    "1-0:72.36.0(00000)",
    "0-0:96.13.0()",
    "1-0:32.7.0(0230.0*V)",
    "1-0:52.7.0(0230.0*V)",
    "1-0:72.7.0(0229.0*V)",
    "1-0:31.7.0(0.48*A)",
    "1-0:51.7.0(0.44*A)",
    "1-0:71.7.0(0.86*A)",
    "1-0:21.7.0(00.070*kW)",
    "1-0:41.7.0(00.032*kW)",
    "1-0:61.7.0(00.142*kW)",
    "1-0:22.7.0(00.000*kW)",
    "1-0:42.7.0(00.000*kW)",
    "1-0:62.7.0(00.000*kW)",
    "0-1:24.1.0(003)",
    "0-1:96.1.0(3232323241424344313233343536373839)",
    "0-1:24.2.1(170102161005W)(00000.107*m3)",
    "0-2:24.1.0(003)",
    "0-2:96.1.0()",
    "!6EEE",
];

/// Append a correct `!XXXX` end line to header + body lines
pub fn sealed(lines: &[&str]) -> Vec<String> {
    let mut all: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    all.push("!".to_string());
    let crc = match Telegram::from_lines(&all) {
        Some(unsealed) => crc16_arc(&unsealed.crc_payload()),
        None => 0,
    };
    let last = all.len() - 1;
    all[last] = format!("!{:04X}", crc);
    all
}

/// Sealed telegram built from fixture lines
pub fn telegram(lines: &[&str]) -> Telegram {
    Telegram::from_lines(&sealed(lines)).expect("fixture telegram")
}
