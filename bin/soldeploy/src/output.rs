//! Human-readable rendering of engine results.

use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};
use soldeploy_engine::{ArtifactBundle, DeployResult, GasEstimate};

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED).set_header(header.to_vec());
    table
}

pub fn bundle(bundle: &ArtifactBundle) -> String {
    let mut table = table(&["Contract", "Source", "Bytecode (bytes)", "ABI entries"]);

    for contract in bundle.contracts() {
        let bytecode_len = contract.bytecode.trim_start_matches("0x").len() / 2;
        let abi_entries = contract.abi.as_array().map_or(0, Vec::len);
        table.add_row(vec![
            contract.name.clone(),
            contract.source_file.clone(),
            bytecode_len.to_string(),
            abi_entries.to_string(),
        ]);
    }

    table.to_string()
}

pub fn deploy_result(result: &DeployResult) -> String {
    let mut table = table(&["Field", "Value"]);

    let status = if result.is_dry_run {
        "dry run (nothing sent)"
    } else {
        "deployed"
    };

    table.add_row(vec!["Contract".to_string(), result.contract_name.clone()]);
    table.add_row(vec!["Status".to_string(), status.to_string()]);
    table.add_row(vec!["Address".to_string(), result.address.to_string()]);
    table.add_row(vec!["Transaction".to_string(), result.tx_hash.to_string()]);
    table.add_row(vec!["Block".to_string(), result.block_number.to_string()]);
    table.add_row(vec![
        if result.is_dry_run {
            "Estimated gas"
        } else {
            "Gas used"
        }
        .to_string(),
        result.gas_used.to_string(),
    ]);
    table.add_row(vec!["Gas limit".to_string(), result.gas_limit.to_string()]);
    table.add_row(vec!["Chain id".to_string(), result.chain_id.to_string()]);
    table.add_row(vec!["Fees".to_string(), result.fee_model.to_string()]);

    let mut out = table.to_string();
    for warning in &result.warnings {
        out.push_str(&format!("\nwarning: {}", warning));
    }
    out
}

pub fn gas_estimate(estimate: &GasEstimate) -> String {
    let mut table = table(&["Contract", "Gas used", "With buffer"]);
    table.add_row(vec![
        estimate.contract_name.clone(),
        estimate.estimated_gas.to_string(),
        estimate.estimated_gas_with_buffer.to_string(),
    ]);
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use soldeploy_engine::FeeModel;

    #[test]
    fn test_dry_run_rendering() {
        let result = DeployResult {
            contract_name: "Counter".to_string(),
            address: Default::default(),
            tx_hash: Default::default(),
            block_number: 0,
            gas_used: 95_000,
            gas_limit: 114_000,
            chain_id: 1337,
            fee_model: FeeModel::Legacy {
                gas_price: 2_000_000_000,
            },
            abi: serde_json::json!([]),
            bytecode: "0x6080".to_string(),
            is_dry_run: true,
            warnings: vec!["local gas estimation failed".to_string()],
        };

        let rendered = deploy_result(&result);

        assert!(rendered.contains("dry run"));
        assert!(rendered.contains("Estimated gas"));
        assert!(rendered.contains("95000"));
        assert!(rendered.contains(&format!("0x{}", "0".repeat(40))));
        assert!(rendered.ends_with("warning: local gas estimation failed"));
    }

    #[test]
    fn test_gas_estimate_rendering() {
        let rendered = gas_estimate(&GasEstimate {
            contract_name: "Counter".to_string(),
            estimated_gas: 100_000,
            estimated_gas_with_buffer: 120_000,
        });

        assert!(rendered.contains("Counter"));
        assert!(rendered.contains("120000"));
    }
}
