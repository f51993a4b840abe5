use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "auraprobe",
    version,
    about = "@AuraEnabled endpoint reconnaissance tool",
    long_about = "auraprobe finds zero-argument @AuraEnabled methods in Apex classes, replays a captured Aura request against each one and flags return values that look like leaked secrets.\n\nExamples:\n  auraprobe\n  auraprobe -d force-app/main/default/classes -R burp_req.txt\n  auraprobe -R req.txt --proxy http://127.0.0.1:8080 -o results.json\n\nTip: Use --config to persist settings and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "vb",
        visible_alias = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase verbosity (-v, -vv)."
    )]
    pub verbose: u8,

    #[arg(
        long = "nc",
        visible_alias = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'C',
        long = "cfg",
        visible_alias = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.auraprobe/config.yml when present)."
    )]
    pub config: Option<String>,

    #[arg(
        long = "ic",
        visible_alias = "init-config",
        help_heading = "Input",
        help = "Write a commented default config to ~/.auraprobe/config.yml and exit."
    )]
    pub init_config: bool,

    #[arg(
        short = 'd',
        long = "cd",
        visible_alias = "classes-dir",
        value_name = "DIR",
        help_heading = "Input",
        help = "Directory holding the Apex class sources (default: classes)."
    )]
    pub classes_dir: Option<String>,

    #[arg(
        short = 'n',
        long = "pkg",
        visible_alias = "package-xml",
        value_name = "FILE",
        help_heading = "Input",
        help = "Project descriptor holding <namespacePrefix> (default: package.xml)."
    )]
    pub package_xml: Option<String>,

    #[arg(
        short = 'R',
        long = "rr",
        visible_alias = "raw-request",
        value_name = "FILE",
        help_heading = "Input",
        help = "Captured Aura POST request, as copied from an intercepting proxy (default: req.txt)."
    )]
    pub request_file: Option<String>,

    #[arg(
        long = "ext",
        visible_alias = "extension",
        value_name = "EXT",
        help_heading = "Input",
        help = "Class source file extension (default: cls)."
    )]
    pub extension: Option<String>,

    #[arg(
        short = 'F',
        long = "fld",
        visible_alias = "field",
        value_name = "NAME",
        help_heading = "Scan",
        help = "Form field carrying the Aura action payload (default: message)."
    )]
    pub message_field: Option<String>,

    #[arg(
        long = "sf",
        visible_alias = "strict-field",
        help_heading = "Scan",
        help = "Abort when the payload field is missing from the captured body."
    )]
    pub strict_field: bool,

    #[arg(
        long = "aoe",
        visible_alias = "abort-on-error",
        help_heading = "Scan",
        help = "Abort on the first network failure instead of recording it."
    )]
    pub abort_on_error: bool,

    #[arg(
        short = 'r',
        long = "rt",
        visible_alias = "rate",
        value_name = "RPS",
        help_heading = "HTTP",
        help = "Request rate ceiling (requests per second)."
    )]
    pub rate: Option<u32>,

    #[arg(
        long = "to",
        visible_alias = "timeout",
        value_name = "SECONDS",
        help_heading = "HTTP",
        help = "Request timeout in seconds (default: 30)."
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'x',
        long = "px",
        visible_alias = "proxy",
        value_name = "URL",
        help_heading = "HTTP",
        help = "Route requests through a proxy (e.g. http://127.0.0.1:8080)."
    )]
    pub proxy: Option<String>,

    #[arg(
        short = 'H',
        long = "hdr",
        visible_alias = "header",
        value_name = "HEADER",
        help_heading = "HTTP",
        help = "Extra header sent with every request ('Key: Value')."
    )]
    pub header: Option<String>,

    #[arg(
        long = "frd",
        visible_alias = "follow-redirects",
        help_heading = "HTTP",
        help = "Follow redirects (up to 10)."
    )]
    pub follow_redirects: bool,

    #[arg(
        long = "scheme",
        value_name = "SCHEME",
        help_heading = "HTTP",
        help = "URL scheme for the replayed request (default: https)."
    )]
    pub scheme: Option<String>,

    #[arg(
        short = 'D',
        long = "od",
        visible_alias = "output-dir",
        value_name = "DIR",
        help_heading = "Output",
        help = "Directory for per-method result files (default: auraenabled_responses)."
    )]
    pub output_dir: Option<String>,

    #[arg(
        short = 'o',
        long = "out",
        visible_alias = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write a summary report of all probed methods."
    )]
    pub output: Option<String>,

    #[arg(
        long = "of",
        visible_alias = "output-format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Summary report format: text or json (inferred from --output when omitted)."
    )]
    pub output_format: Option<String>,
}
