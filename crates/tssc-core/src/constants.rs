//! Application wide identifiers

/// Application name, also used as the service account and field manager name.
pub const APP_NAME: &str = "tssc";

/// Organization owning the installer.
pub const ORG_NAME: &str = "redhat-appstudio";

/// Organization domain.
pub const DOMAIN: &str = "github.com";

/// Reverse repository URI used to prefix labels and annotations.
pub const REPO_URI: &str = "tssc.redhat-appstudio.github.com";

/// Default configuration file name, inside the installer resources.
pub const CONFIG_FILENAME: &str = "config.yaml";

/// Values template file name, inside the installer resources.
pub const VALUES_FILENAME: &str = "values.yaml.tpl";

/// Directory holding the charts, inside the installer resources.
pub const CHARTS_DIR: &str = "charts";

/// Chart annotation naming the product a chart is responsible for.
pub const PRODUCT_NAME_ANNOTATION: &str = "tssc.redhat-appstudio.github.com/product-name";

/// Chart annotation listing the charts required before this one.
pub const DEPENDS_ON_ANNOTATION: &str = "tssc.redhat-appstudio.github.com/depends-on";

/// Chart annotation asking to deploy into the namespace of a product.
pub const USE_PRODUCT_NAMESPACE_ANNOTATION: &str =
    "tssc.redhat-appstudio.github.com/use-product-namespace";

/// Build a label or annotation key under the repository URI.
pub fn repo_key(name: &str) -> String {
    format!("{REPO_URI}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotations_share_repo_uri() {
        assert_eq!(repo_key("product-name"), PRODUCT_NAME_ANNOTATION);
        assert_eq!(repo_key("depends-on"), DEPENDS_ON_ANNOTATION);
        assert_eq!(
            repo_key("use-product-namespace"),
            USE_PRODUCT_NAMESPACE_ANNOTATION
        );
        assert_eq!(REPO_URI, format!("{APP_NAME}.{ORG_NAME}.{DOMAIN}"));
    }
}
