use serde::{Deserialize, Serialize};

pub const PRODUCTION_BASE: &str = "https://hsformwidget.azurewebsites.net";
pub const QA_BASE: &str = "https://hsformwidget-test.azurewebsites.net";
pub const DEV_BASE: &str = "https://hsformwidget-dev.azurewebsites.net";

const QA_HOSTS: [&str; 3] = [
    "hsformwidget-test.azurewebsites.net",
    "hsformwidget-qa.azurewebsites.net",
    "hsformwidget-staging.azurewebsites.net",
];
const DEV_HOSTS: [&str; 1] = ["localhost"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Qa,
    Dev,
}

/// Static hostname → environment routing table.
#[derive(Debug, Clone)]
pub struct EndpointTable {
    production: &'static str,
    qa: &'static str,
    dev: &'static str,
    qa_hosts: &'static [&'static str],
    dev_hosts: &'static [&'static str],
}

impl Default for EndpointTable {
    fn default() -> Self {
        Self {
            production: PRODUCTION_BASE,
            qa: QA_BASE,
            dev: DEV_BASE,
            qa_hosts: &QA_HOSTS,
            dev_hosts: &DEV_HOSTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub environment: Environment,
    pub base_url: &'static str,
}

impl EndpointTable {
    pub fn environment_for(&self, domain: &str, force_production: bool) -> Environment {
        if force_production {
            return Environment::Production;
        }
        let matches = |hosts: &[&str]| hosts.iter().any(|h| h.eq_ignore_ascii_case(domain));
        if matches(self.qa_hosts) {
            Environment::Qa
        } else if matches(self.dev_hosts) {
            Environment::Dev
        } else {
            Environment::Production
        }
    }

    pub fn base_url(&self, environment: Environment) -> &'static str {
        match environment {
            Environment::Production => self.production,
            Environment::Qa => self.qa,
            Environment::Dev => self.dev,
        }
    }

    pub fn resolve(&self, domain: &str, force_production: bool) -> Endpoint {
        let environment = self.environment_for(domain, force_production);
        Endpoint {
            environment,
            base_url: self.base_url(environment),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qa_hosts_route_to_qa() {
        let table = EndpointTable::default();
        for host in QA_HOSTS {
            assert_eq!(table.resolve(host, false).base_url, QA_BASE);
        }
        assert_eq!(
            table.resolve("HSFormWidget-Test.azurewebsites.net", false).environment,
            Environment::Qa
        );
    }

    #[test]
    fn localhost_routes_to_dev() {
        let endpoint = EndpointTable::default().resolve("localhost", false);
        assert_eq!(endpoint.environment, Environment::Dev);
        assert_eq!(endpoint.base_url, DEV_BASE);
    }

    #[test]
    fn unknown_domains_default_to_production() {
        let table = EndpointTable::default();
        assert_eq!(table.resolve("shop.example.com", false).base_url, PRODUCTION_BASE);
        assert_eq!(table.resolve("", false).environment, Environment::Production);
    }

    #[test]
    fn production_flag_overrides_table() {
        let table = EndpointTable::default();
        assert_eq!(
            table.resolve("hsformwidget-test.azurewebsites.net", true).environment,
            Environment::Production
        );
    }
}
