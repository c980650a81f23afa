use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    pub parameters: &'static str,
    pub context_length: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_support: Option<bool>,
    pub input_cost_per_token: f64,
    pub output_cost_per_token: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_cost_per_request: Option<f64>,
    pub max_requests_per_min: u32,
    pub capabilities: &'static [&'static str],
    pub specialization: &'static str,
    pub is_premium: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
    pub status: &'static str,
    pub created_at: &'static str,
}

const BUILTIN_MODELS: [ModelInfo; 6] = [
    ModelInfo {
        id: "fortec-7",
        name: "Fortec-7",
        description: "Our most advanced model with exceptional capabilities across various domains.",
        version: "1.0",
        parameters: "175 billion",
        context_length: 32000,
        image_support: None,
        input_cost_per_token: 0.00001,
        output_cost_per_token: 0.00002,
        image_cost_per_request: None,
        max_requests_per_min: 1000,
        capabilities: &[
            "natural-language-understanding",
            "code-generation",
            "reasoning",
            "problem-solving",
            "multilingual",
            "content-creation",
        ],
        specialization: "general-purpose",
        is_premium: true,
        is_new: None,
        status: "available",
        created_at: "2025-01-15T00:00:00Z",
    },
    ModelInfo {
        id: "fortec-code",
        name: "Fortec Code",
        description: "Specialized for programming tasks with optimized capabilities for multiple languages.",
        version: "1.0",
        parameters: "35 billion",
        context_length: 16000,
        image_support: None,
        input_cost_per_token: 0.000005,
        output_cost_per_token: 0.00001,
        image_cost_per_request: None,
        max_requests_per_min: 1500,
        capabilities: &[
            "code-generation",
            "code-completion",
            "bug-detection",
            "code-refactoring",
            "code-explanation",
            "documentation-generation",
        ],
        specialization: "programming",
        is_premium: false,
        is_new: None,
        status: "available",
        created_at: "2025-02-01T00:00:00Z",
    },
    ModelInfo {
        id: "fortec-expert",
        name: "Fortec Expert",
        description: "Optimized for analytical tasks requiring deeper subject matter expertise.",
        version: "1.0",
        parameters: "70 billion",
        context_length: 24000,
        image_support: None,
        input_cost_per_token: 0.000008,
        output_cost_per_token: 0.000015,
        image_cost_per_request: None,
        max_requests_per_min: 500,
        capabilities: &[
            "academic-research",
            "data-analysis",
            "technical-writing",
            "financial-modeling",
            "scientific-computing",
        ],
        specialization: "analysis-research",
        is_premium: true,
        is_new: None,
        status: "available",
        created_at: "2025-02-15T00:00:00Z",
    },
    ModelInfo {
        id: "fortec-lite",
        name: "Fortec Lite",
        description: "Efficient, lightweight model designed for fast performance and basic tasks.",
        version: "1.0",
        parameters: "7 billion",
        context_length: 8000,
        image_support: None,
        input_cost_per_token: 0.000002,
        output_cost_per_token: 0.000004,
        image_cost_per_request: None,
        max_requests_per_min: 2000,
        capabilities: &[
            "text-generation",
            "summarization",
            "question-answering",
            "sentiment-analysis",
            "language-translation",
        ],
        specialization: "everyday-tasks",
        is_premium: false,
        is_new: None,
        status: "available",
        created_at: "2025-03-01T00:00:00Z",
    },
    ModelInfo {
        id: "fortec-business",
        name: "Fortec Business",
        description: "Purpose-built for business applications with enhanced security and compliance.",
        version: "1.0",
        parameters: "45 billion",
        context_length: 16000,
        image_support: None,
        input_cost_per_token: 0.000007,
        output_cost_per_token: 0.000012,
        image_cost_per_request: None,
        max_requests_per_min: 800,
        capabilities: &[
            "document-generation",
            "market-analysis",
            "feedback-processing",
            "content-creation",
            "email-drafting",
        ],
        specialization: "business-operations",
        is_premium: false,
        is_new: None,
        status: "available",
        created_at: "2025-03-15T00:00:00Z",
    },
    ModelInfo {
        id: "fortec-vision",
        name: "Fortec Vision",
        description: "Cutting-edge multimodal model with advanced image understanding capabilities.",
        version: "1.0",
        parameters: "90 billion",
        context_length: 12000,
        image_support: Some(true),
        input_cost_per_token: 0.00001,
        output_cost_per_token: 0.00002,
        image_cost_per_request: Some(0.002),
        max_requests_per_min: 400,
        capabilities: &[
            "image-recognition",
            "visual-content-generation",
            "chart-interpretation",
            "image-description",
            "visual-reasoning",
        ],
        specialization: "visual-understanding",
        is_premium: true,
        is_new: Some(true),
        status: "available",
        created_at: "2025-04-01T00:00:00Z",
    },
];

/// Read-only list of the Fortec models advertised by the API.
#[derive(Clone)]
pub struct ModelCatalog {
    models: Arc<Vec<ModelInfo>>,
}

impl ModelCatalog {
    pub fn builtin() -> Self {
        Self {
            models: Arc::new(BUILTIN_MODELS.to_vec()),
        }
    }

    pub fn all(&self) -> &[ModelInfo] {
        &self.models
    }

    pub fn get(&self, id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == id)
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
