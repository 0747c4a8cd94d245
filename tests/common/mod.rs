#![allow(dead_code)]

use std::fs;
use std::path::Path;

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

/// Writes a black BMP frame.
pub fn write_frame(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height)).expect("write frame");
}

/// Writes the decoder sidecar for `frame`: one barcode per `(text, x, y, side)`.
pub fn write_sidecar(frame: &Path, barcodes: &[(&str, f64, f64, f64)]) {
    let results: Vec<serde_json::Value> = barcodes
        .iter()
        .map(|(text, x, y, side)| {
            serde_json::json!({
                "barcodeText": text,
                "barcodeFormatString": "EAN_13",
                "localizationResult": {
                    "points": [
                        {"x": x, "y": y},
                        {"x": x + side, "y": y},
                        {"x": x + side, "y": y + side},
                        {"x": x, "y": y + side}
                    ]
                }
            })
        })
        .collect();
    let mut name = frame.file_name().expect("frame file name").to_os_string();
    name.push(".barcodes.json");
    fs::write(
        frame.with_file_name(name),
        serde_json::to_string(&results).expect("serialize sidecar"),
    )
    .expect("write sidecar");
}

/// Writes a reference table in the store's inventory shape.
pub fn write_reference(path: &Path, rows: &[(&str, &str)]) {
    let rows: Vec<serde_json::Value> = rows
        .iter()
        .map(|(id, reported)| {
            serde_json::json!({"ItemID": id, "Name": format!("Item {id}"), "Reported": reported})
        })
        .collect();
    fs::write(path, serde_json::to_string(&rows).expect("serialize reference"))
        .expect("write reference");
}
