use arnet_catalog::MessageCatalog;

use crate::cmd::{CatalogCommand, Context};
use crate::exit::{CliError, CliResult, SUCCESS, USAGE};
use crate::output::print_descriptors;

pub fn run(command: CatalogCommand, context: &Context) -> CliResult<i32> {
    let catalog = context.load_catalog()?;
    match command {
        CatalogCommand::List(args) => {
            if let Some(feature) = &args.feature {
                if !catalog.features().any(|(_, name)| name == feature) {
                    return Err(CliError::new(USAGE, format!("unknown feature: {feature}")));
                }
            }
            let descriptors = catalog
                .descriptors()
                .filter(|d| args.feature.as_ref().is_none_or(|f| &d.feature == f))
                .map(|d| d.as_ref());
            print_descriptors(descriptors, &catalog, context.format);
        }
        CatalogCommand::Resolve(args) => {
            let descriptor = catalog.resolve_path(&args.path).ok_or_else(|| {
                CliError::new(USAGE, format!("no catalog message named '{}'", args.path))
            })?;
            print_descriptors([descriptor.as_ref()], &catalog, context.format);
        }
    }
    Ok(SUCCESS)
}
