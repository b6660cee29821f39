//! Tools command - list discovered capabilities.

use anyhow::Result;
use clap::Args;
use conduit_mcp::{CapabilityKind, Catalog};
use console::{Style, style};
use serde_json::json;

use super::Context;

/// Arguments for the tools command.
#[derive(Args, Debug)]
pub struct ToolsArgs {
    /// Print the JSON schema of each capability's arguments
    #[arg(long)]
    pub schemas: bool,
}

/// Run the tools command.
pub fn run(args: ToolsArgs, ctx: &Context) -> Result<()> {
    let session = ctx.connect()?;
    let router = ctx.router(&session)?;
    let catalog = router.catalog();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&catalog_json(catalog))?);
    } else {
        print_table(catalog, args.schemas, router.policy());
    }
    Ok(())
}

fn kind_str(kind: CapabilityKind) -> &'static str {
    match kind {
        CapabilityKind::Tool => "tool",
        CapabilityKind::Resource => "resource",
    }
}

fn catalog_json(catalog: &Catalog) -> serde_json::Value {
    let mut entries: Vec<_> = catalog
        .descriptors()
        .iter()
        .map(|d| {
            json!({
                "name": d.name,
                "kind": kind_str(d.kind()),
                "description": d.description,
                "parameters": d.parameters,
            })
        })
        .collect();
    entries.extend(catalog.prompts().iter().map(|p| {
        json!({
            "name": p.name,
            "kind": "prompt",
            "description": p.description.clone().unwrap_or_default(),
            "arguments": p.arguments,
        })
    }));
    json!(entries)
}

fn print_table(catalog: &Catalog, schemas: bool, policy: &conduit_mcp::ApprovalPolicy) {
    let dim = Style::new().dim();

    if catalog.is_empty() {
        println!("The server offers no tools or resources.");
    } else {
        print_capabilities(catalog, schemas, policy);
    }

    if !catalog.prompts().is_empty() {
        println!();
        println!("{}", style(format!("{} prompts", catalog.prompts().len())).bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        for prompt in catalog.prompts() {
            let args: Vec<String> = prompt
                .arguments
                .iter()
                .map(|a| if a.required { a.name.clone() } else { format!("[{}]", a.name) })
                .collect();
            println!(
                "  {} {}",
                style(&prompt.name).cyan(),
                dim.apply_to(args.join(" "))
            );
            if let Some(description) = &prompt.description {
                println!("      {}", description);
            }
        }
    }
}

fn print_capabilities(catalog: &Catalog, schemas: bool, policy: &conduit_mcp::ApprovalPolicy) {
    let dim = Style::new().dim();

    println!("{}", style(format!("{} capabilities", catalog.len())).bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    for descriptor in catalog.descriptors() {
        let gate = if policy.requires_approval(descriptor) {
            style(" (approval)").yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {}{}",
            style(&descriptor.name).cyan(),
            dim.apply_to(format!("[{}]", kind_str(descriptor.kind()))),
            gate
        );
        if !descriptor.description.is_empty() {
            println!("      {}", descriptor.description);
        }
        if schemas {
            let schema = serde_json::to_string_pretty(&descriptor.parameters)
                .unwrap_or_else(|_| descriptor.parameters.to_string());
            for line in schema.lines() {
                println!("      {}", dim.apply_to(line));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_mcp::{CapabilityDescriptor, PromptInfo, ResourceInfo, ToolInfo};

    #[test]
    fn test_catalog_json_lists_kinds() {
        let tool: ToolInfo = serde_json::from_value(json!({"name": "add_two_numbers"})).unwrap();
        let resource: ResourceInfo =
            serde_json::from_value(json!({"uri": "users://{user_id}/profile", "name": "user_profile"}))
                .unwrap();
        let catalog = Catalog::from_descriptors([
            CapabilityDescriptor::from_tool(&tool),
            CapabilityDescriptor::from_resource(&resource).unwrap(),
        ]);
        let prompt: PromptInfo = serde_json::from_value(
            json!({"name": "summarize", "arguments": [{"name": "doc_id", "required": true}]}),
        )
        .unwrap();
        let catalog = catalog.with_prompts(vec![prompt]);

        let value = catalog_json(&catalog);
        assert_eq!(value[0]["kind"], "tool");
        assert_eq!(value[1]["name"], "resource_user_profile");
        assert_eq!(value[1]["kind"], "resource");
        assert_eq!(value[1]["parameters"]["required"], json!(["user_id"]));
        assert_eq!(value[2]["kind"], "prompt");
        assert_eq!(value[2]["arguments"][0]["name"], "doc_id");
    }
}
