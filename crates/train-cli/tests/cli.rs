//! End-to-end tests for the `train` binary.

use anyhow::Result;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

#[test]
fn test_catalog_json_lists_configured_events() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("train.yml");
    fs::write(
        &config_path,
        r"
public_events:
  - shop/cart/item/add
private_events:
  - shop/cart/draft/save
frame_selectors:
  - cart-frame
",
    )?;

    let output = Command::new(env!("CARGO_BIN_EXE_train"))
        .arg("catalog")
        .arg("--format")
        .arg("json")
        .arg("--config")
        .arg(&config_path)
        .output()?;
    assert!(output.status.success());

    let catalog: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let events: Vec<&str> = catalog["events"]
        .as_array()
        .map(|events| events.iter().filter_map(|event| event.as_str()).collect())
        .unwrap_or_default();
    assert!(events.contains(&"shop/cart/item/add"));
    assert!(events.contains(&"system/iframe/init"));
    assert!(!events.contains(&"shop/cart/draft/save"));
    assert!(
        catalog["frameSelectors"]
            .as_array()
            .is_some_and(|selectors| selectors.iter().any(|selector| selector == "cart-frame"))
    );
    Ok(())
}

#[test]
fn test_conflicting_config_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config_path = temp_dir.path().join("train.yml");
    fs::write(
        &config_path,
        "public_events: [a/b/c]\nprivate_events: [a/b/c]\n",
    )?;

    let output = Command::new(env!("CARGO_BIN_EXE_train"))
        .arg("catalog")
        .arg("--config")
        .arg(&config_path)
        .output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("a/b/c"));
    Ok(())
}

#[test]
fn test_simulate_reports_cross_frame_delivery() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let scenario_path = temp_dir.path().join("page.yml");
    fs::write(
        &scenario_path,
        r"
name: checkout
config:
  frame_selectors: [cart-frame]
frames:
  - class: cart-frame
    origin: https://widgets.example
    config:
      public_events: [shop/cart/item/add]
steps:
  - subscribe: { context: top, event: shop/cart/item/add }
  - publish: { context: cart-frame, event: shop/cart/item/add, payload: { sku: A1 } }
",
    )?;

    let output = Command::new(env!("CARGO_BIN_EXE_train"))
        .arg("simulate")
        .arg(&scenario_path)
        .arg("--format")
        .arg("json")
        .current_dir(temp_dir.path())
        .output()?;
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["name"], "checkout");
    assert_eq!(report["deliveries"][0]["context"], "top");
    assert_eq!(report["deliveries"][0]["event"], "shop/cart/item/add");
    assert_eq!(report["deliveries"][0]["source"], "IFRAME");
    assert_eq!(report["contexts"][1]["handshake"], "synced");
    Ok(())
}

#[test]
fn test_simulate_table_output() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let scenario_path = temp_dir.path().join("page.yml");
    fs::write(
        &scenario_path,
        "steps:\n  - publish: { context: top, event: nobody/knows/this }\n",
    )?;

    let output = Command::new(env!("CARGO_BIN_EXE_train"))
        .arg("simulate")
        .arg(&scenario_path)
        .current_dir(temp_dir.path())
        .output()?;
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Failures (1):"));
    assert!(stdout.contains("nobody/knows/this"));
    Ok(())
}
