//! Terminal output helpers

use console::style;

const DISCLAIMER: &str = "\
The installer configuration is stored in the cluster and shared by every
installer run. Review the products and namespaces before deploying, changes
to a deployed configuration are applied on the next deploy.";

pub fn disclaimer() {
    eprintln!("{}\n", style(DISCLAIMER).dim());
}

/// A step in progress
pub fn step(message: &str) {
    println!("{} {}", style("→").blue().bold(), message);
}

pub fn success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// A section header followed by a blank line
pub fn header(title: &str) {
    println!("#\n# {}\n#\n", style(title).bold());
}
