use validator::Validate;

use super::types::DeploymentDescriptor;
use crate::error::{Error, Result};

/// Validate a descriptor without touching any remote API.
///
/// Field-level rules come from the `validator` derive on the types; the
/// cross-field rules (Fargate sizing table, ingress coverage, CIDR syntax)
/// live here. A failure is fatal for the apply cycle and guarantees no
/// side effects were attempted.
pub fn validate_descriptor(descriptor: &DeploymentDescriptor) -> Result<()> {
    descriptor
        .validate()
        .map_err(|e| Error::Validation(e.to_string()))?;

    if descriptor.image.chars().any(char::is_whitespace) {
        return Err(Error::Validation(format!(
            "image reference '{}' contains whitespace",
            descriptor.image
        )));
    }

    if !memory_valid_for_cpu(descriptor.cpu, descriptor.memory) {
        return Err(Error::Validation(format!(
            "cpu={} with memory={}MiB is not a supported Fargate combination",
            descriptor.cpu, descriptor.memory
        )));
    }

    for subnet in &descriptor.network.subnets {
        if subnet.trim().is_empty() {
            return Err(Error::Validation("subnet id must not be blank".to_string()));
        }
    }

    for rule in &descriptor.network.ingress {
        if rule.port == 0 {
            return Err(Error::Validation("ingress port must be in 1-65535".to_string()));
        }
        if rule.cidr.parse::<ipnet::IpNet>().is_err() {
            return Err(Error::Validation(format!(
                "ingress cidr '{}' is not a valid CIDR block",
                rule.cidr
            )));
        }
        match rule.protocol.as_str() {
            "tcp" | "udp" => {}
            other => {
                return Err(Error::Validation(format!(
                    "ingress protocol '{}' is not supported (tcp or udp)",
                    other
                )));
            }
        }
    }

    // Explicit rules must actually let traffic reach the exposed port
    if !descriptor.network.ingress.is_empty()
        && !descriptor
            .network
            .ingress
            .iter()
            .any(|r| r.port == descriptor.container_port)
    {
        return Err(Error::Validation(format!(
            "no ingress rule opens the exposed container port {}",
            descriptor.container_port
        )));
    }

    Ok(())
}

/// Fargate only accepts certain CPU/memory pairings; anything else is
/// rejected at task definition registration, so catch it offline.
fn memory_valid_for_cpu(cpu: u32, memory: u32) -> bool {
    match cpu {
        256 => matches!(memory, 512 | 1024 | 2048),
        512 => (1024..=4096).contains(&memory) && memory % 1024 == 0,
        1024 => (2048..=8192).contains(&memory) && memory % 1024 == 0,
        2048 => (4096..=16384).contains(&memory) && memory % 1024 == 0,
        4096 => (8192..=30720).contains(&memory) && memory % 1024 == 0,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{IngressRule, NetworkPlacement};

    fn valid() -> DeploymentDescriptor {
        toml::from_str(
            r#"
            name = "chatbot"
            image = "chatbot:v1"
            container_port = 8080
        "#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_descriptor_passes() {
        assert!(validate_descriptor(&valid()).is_ok());
    }

    #[test]
    fn test_missing_image_rejected() {
        let mut descriptor = valid();
        descriptor.image = String::new();
        let err = validate_descriptor(&descriptor).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut descriptor = valid();
        descriptor.container_port = 0;
        assert!(matches!(
            validate_descriptor(&descriptor),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_zero_desired_count_rejected() {
        let mut descriptor = valid();
        descriptor.desired_count = 0;
        assert!(matches!(
            validate_descriptor(&descriptor),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_bad_sizing_rejected() {
        let mut descriptor = valid();
        descriptor.cpu = 256;
        descriptor.memory = 4096;
        assert!(matches!(
            validate_descriptor(&descriptor),
            Err(Error::Validation(_))
        ));

        descriptor.cpu = 123;
        descriptor.memory = 512;
        assert!(validate_descriptor(&descriptor).is_err());
    }

    #[test]
    fn test_sizing_table() {
        assert!(memory_valid_for_cpu(256, 512));
        assert!(memory_valid_for_cpu(512, 4096));
        assert!(memory_valid_for_cpu(1024, 2048));
        assert!(!memory_valid_for_cpu(512, 512));
        assert!(!memory_valid_for_cpu(1024, 3000));
        assert!(!memory_valid_for_cpu(8192, 16384));
    }

    #[test]
    fn test_ingress_must_cover_container_port() {
        let mut descriptor = valid();
        descriptor.network = NetworkPlacement {
            ingress: vec![IngressRule {
                port: 443,
                cidr: "0.0.0.0/0".to_string(),
                protocol: "tcp".to_string(),
            }],
            ..NetworkPlacement::default()
        };
        assert!(matches!(
            validate_descriptor(&descriptor),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_bad_cidr_rejected() {
        let mut descriptor = valid();
        descriptor.network.ingress.push(IngressRule {
            port: 8080,
            cidr: "not-a-cidr".to_string(),
            protocol: "tcp".to_string(),
        });
        assert!(matches!(
            validate_descriptor(&descriptor),
            Err(Error::Validation(_))
        ));
    }
}
