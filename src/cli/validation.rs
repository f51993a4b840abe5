use crate::cli::args::CliArgs;

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if let Some(rate) = args.rate {
        if rate == 0 {
            return Err("invalid rate, expected positive integer".to_string());
        }
    }
    if let Some(timeout) = args.timeout {
        if timeout == 0 {
            return Err("invalid timeout, expected positive integer".to_string());
        }
    }
    if let Some(raw) = args.output_format.as_deref() {
        if crate::output::OutputFormat::parse(raw).is_none() {
            return Err(format!(
                "invalid --output-format '{raw}', expected text or json"
            ));
        }
    }
    if let Some(raw) = args.scheme.as_deref() {
        let scheme = raw.trim().to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(format!("invalid --scheme '{raw}', expected http or https"));
        }
    }
    if let Some(raw) = args.message_field.as_deref() {
        let field = raw.trim();
        if field.is_empty() || field.contains('=') || field.contains('&') {
            return Err(format!("invalid --field '{raw}'"));
        }
    }
    if let Some(raw) = args.header.as_deref() {
        if !raw.contains(':') {
            return Err(format!("invalid --header '{raw}', expected 'Key: Value'"));
        }
    }
    Ok(())
}
