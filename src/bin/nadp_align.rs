use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use nadp_align::{
    align, alignment_config_from_env, init_logging, log_inputs_selected, log_output_written,
    log_run_finish, log_run_start, logging_config_from_env, merge_site_info, normalize,
    read_raw_table_from_path, read_variable_metadata, AlignedDataset, AssemblyReport,
    NormalizeConfig, NormalizeReport,
};
use serde::Serialize;

#[derive(Serialize)]
struct RunReport<'a> {
    fingerprint: String,
    calendar_start: Option<String>,
    calendar_end: Option<String>,
    normalize: &'a NormalizeReport,
    assembly: &'a AssemblyReport,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_run_start(&logging_cfg);

    let data_path = std::env::var("NADP_INPUT_CSV")
        .map(PathBuf::from)
        .map_err(|_| "NADP_INPUT_CSV must name the NADP data CSV")?;
    let sites_path = std::env::var("NADP_SITES_CSV").ok().map(PathBuf::from);
    let metadata_path = std::env::var("NADP_METADATA_CSV").ok().map(PathBuf::from);
    log_inputs_selected(&data_path, sites_path.as_deref(), metadata_path.as_deref());

    let mut raw = read_raw_table_from_path(&data_path)?;
    if let Some(path) = &sites_path {
        let sites = read_raw_table_from_path(path)?;
        raw = merge_site_info(&raw, &sites)?;
    }
    let metadata = match &metadata_path {
        Some(path) => read_variable_metadata(File::open(path)?)?,
        None => Vec::new(),
    };

    let (table, normalize_report) = normalize(&raw, &NormalizeConfig::default());
    let (dataset, assembly_report) = align(&table, &alignment_config_from_env(), &metadata)?;

    let output_path = std::env::var("NADP_OUTPUT_CSV").ok().map(PathBuf::from);
    let records = match &output_path {
        Some(path) => write_long_csv(&dataset, File::create(path)?)?,
        None => write_long_csv(&dataset, io::stdout().lock())?,
    };
    log_output_written(output_path.as_deref(), records);

    let fingerprint = dataset.fingerprint();
    log_run_finish(
        &fingerprint,
        assembly_report.failed_variables.len(),
        normalize_report.diagnostics.len() + assembly_report.diagnostics.len(),
    );

    let report = RunReport {
        fingerprint,
        calendar_start: dataset.calendar().first().map(ToString::to_string),
        calendar_end: dataset.calendar().last().map(ToString::to_string),
        normalize: &normalize_report,
        assembly: &assembly_report,
    };
    let mut stderr = io::stderr().lock();
    serde_json::to_writer_pretty(&mut stderr, &report)?;
    writeln!(stderr)?;

    Ok(())
}

fn write_long_csv<W: Write>(dataset: &AlignedDataset, out: W) -> Result<u64, csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    let mut records = 0;
    for record in dataset.long_records() {
        writer.serialize(record)?;
        records += 1;
    }
    writer.flush()?;
    Ok(records)
}
