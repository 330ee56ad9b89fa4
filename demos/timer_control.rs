/**
 * Timer Control Example
 *
 * This example programs the weekly valve timer of an irrigation controller
 * against an in-memory datapoint store, the same way a host integration would
 * after the device reported its datapoints.
 */
use serde_json::json;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tuya_ble_timer::{DatapointStore, MemoryStore, TIMER_DP_ID, TimerBuilder, Weekday, registry};

#[tokio::main]
async fn main() {
    env_logger::init();
    println!("--- tuya-ble-timer - Timer Control ---");

    // 1. Look up the product and feed the reported datapoints into the store
    let Some(product) = registry::lookup("sfkzq", "ldcdnigc") else {
        eprintln!("[ERROR] Product not registered");
        return;
    };
    println!("[INFO] Product: {}", product.name);

    let store = Arc::new(MemoryStore::new());
    let reported = json!({ "7": 88, "12": 2, "17": "AQEBpAAeKmQBB+kGFAE=" });
    match store.apply_dps(&reported, &product.datapoint_kinds()) {
        Ok(count) => println!("[INFO] Stored {} datapoints", count),
        Err(e) => {
            eprintln!("[ERROR] Bad report: {}", e);
            return;
        }
    }

    // 2. Bind a timer with serialized writes so rapid edits cannot overwrite each other
    let timer = match TimerBuilder::new("zx-7378", store.clone())
        .serialize_writes(true)
        .build()
    {
        Ok(t) => t,
        Err(e) => {
            eprintln!("[ERROR] Timer setup failed: {}", e);
            return;
        }
    };
    if let Some(record) = timer.record() {
        println!("[STEP 1] Current schedule: {}", record);
    }

    // 3. Edit a few fields
    println!("[STEP 2] Moving start to 06:45, adding Sunday...");
    for result in [
        timer.set_hour(6),
        timer.set_minute(45),
        timer.set_day(Weekday::Sun, true),
    ] {
        if let Err(e) = result {
            eprintln!("[ERROR] Edit rejected: {}", e);
        }
    }
    sleep(Duration::from_millis(50)).await;

    // 4. Read back
    match timer.record() {
        Some(record) => println!("[SUCCESS] New schedule: {}", record),
        None => println!("[INFO] Timer not configured"),
    }
    if let Some(value) = store.read(TIMER_DP_ID) {
        println!("[INFO] Raw datapoint: {}", value);
    }

    timer.stop();
    println!("[INFO] Example finished.");
}
