use std::env;
use std::path::PathBuf;

use rekey_plan::{ValidationReport, load_manifest, validate};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or("missing manifest path")?;

    let manifest = load_manifest(&path)?;
    let validated = match validate(manifest) {
        Ok(validated) => validated,
        Err(report) => {
            eprintln!("manifest validation failed");
            eprint!("{report}");
            std::process::exit(1);
        }
    };

    if validated.warnings.is_empty() {
        println!("manifest validated successfully");
    } else {
        eprintln!("manifest validated with warnings:");
        eprint!(
            "{}",
            ValidationReport {
                errors: Vec::new(),
                warnings: validated.warnings,
            }
        );
    }

    Ok(())
}
