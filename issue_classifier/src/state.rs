use crate::config::ClassifierConfig;

pub trait State: Send + Sync + 'static {
    fn new(classifier_cfg: &ClassifierConfig) -> Result<Self, String>
    where
        Self: Sized;
    fn get_labels(&self) -> &[String];
    fn confidence_threshold(&self) -> f32;
}

/// Class labels in model output order, plus the threshold they are judged by.
#[derive(Debug, Clone)]
pub struct ServiceState {
    class_labels: Vec<String>,
    confidence_threshold: f32,
}

impl State for ServiceState {
    fn new(classifier_cfg: &ClassifierConfig) -> Result<ServiceState, String> {
        let class_labels: Vec<String> = classifier_cfg
            .classes
            .iter()
            .map(|label| label.trim().to_string())
            .collect();

        if class_labels.is_empty() {
            return Err("Failed to load labels: class list is empty".to_string());
        }
        if let Some(position) = class_labels.iter().position(|label| label.is_empty()) {
            return Err(format!(
                "Failed to load labels: label at index {} is blank",
                position
            ));
        }

        Ok(ServiceState {
            class_labels,
            confidence_threshold: classifier_cfg.confidence_threshold,
        })
    }

    fn get_labels(&self) -> &[String] {
        &self.class_labels
    }

    fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier_config(classes: &[&str]) -> ClassifierConfig {
        ClassifierConfig {
            confidence_threshold: 0.5,
            classes: classes.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_labels_keep_their_order() {
        let cfg = classifier_config(&["Garbage", " Potholes ", "Street Lights"]);
        let state = ServiceState::new(&cfg).unwrap();

        assert_eq!(state.get_labels(), &["Garbage", "Potholes", "Street Lights"]);
        assert_eq!(state.confidence_threshold(), 0.5);
    }

    #[test]
    fn test_blank_label_is_rejected() {
        let cfg = classifier_config(&["Garbage", "  "]);
        let err = ServiceState::new(&cfg).unwrap_err();

        assert!(err.contains("index 1"));
    }

    #[test]
    fn test_empty_label_list_is_rejected() {
        let cfg = classifier_config(&[]);
        assert!(ServiceState::new(&cfg).is_err());
    }
}
