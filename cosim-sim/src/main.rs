use clap::Parser;

fn main() -> anyhow::Result<()> {
    let options = cosim_sim::options::SimOptions::parse();

    let _logger = flexi_logger::Logger::try_with_env_or_str(
        options.verbose.log_level_filter().to_string().to_lowercase(),
    )?
    .start()?;

    let (outputs, stats) = cosim_sim::simulate(&options)?;

    log::info!(
        "Simulation finished at t = {:.1} after {} steps.",
        stats.end_time,
        stats.num_steps
    );

    if let Some(output_file) = &options.output_file {
        let file = std::fs::File::create(output_file)?;
        arrow::csv::writer::WriterBuilder::new()
            .with_header(true)
            .build(file)
            .write(&outputs)?;
    } else {
        println!(
            "Outputs:\n{}",
            arrow::util::pretty::pretty_format_batches(&[outputs])?
        );
    }

    Ok(())
}
