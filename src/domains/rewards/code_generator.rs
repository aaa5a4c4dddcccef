use rand::Rng;
use shared::SurveyConfig;

const CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const CODE_LENGTH: usize = 4;

/// Generates redemption codes for reward sets that contain a pdf reward
#[derive(Debug, Clone)]
pub struct RedemptionCodeGenerator {
    prefix: String,
}

impl RedemptionCodeGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &SurveyConfig) -> Self {
        Self::new(config.redemption_code_prefix.clone())
    }

    /// `<PREFIX>-` followed by four uppercase base-36 characters.
    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect();

        format!("{}-{}", self.prefix, suffix)
    }

    pub fn is_well_formed(&self, code: &str) -> bool {
        code.strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .map_or(false, |suffix| {
                suffix.len() == CODE_LENGTH && suffix.bytes().all(|b| CODE_ALPHABET.contains(&b))
            })
    }
}

impl Default for RedemptionCodeGenerator {
    fn default() -> Self {
        Self::from_config(&SurveyConfig::default())
    }
}
