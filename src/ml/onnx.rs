use ort::{
    CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch,
    GraphOptimizationLevel, Session, Tensor, XNNPACKExecutionProvider,
};

use crate::ml::{
    error::{MlError, MlResult},
    runtime::ExecutionProviderPolicy,
};

pub fn build_session(model_path: &str, policy: &ExecutionProviderPolicy) -> MlResult<Session> {
    let primary_providers = providers_for_policy(policy, true);
    let mut attempts = vec![primary_providers];

    if policy.allow_cpu_fallback && (policy.prefer_cuda || policy.prefer_xnnpack) {
        let cpu_only_policy = ExecutionProviderPolicy {
            prefer_cuda: false,
            prefer_xnnpack: false,
            allow_cpu_fallback: true,
        };
        attempts.push(providers_for_policy(&cpu_only_policy, false));
    }

    let mut errors = Vec::new();
    for providers in attempts {
        if providers.is_empty() {
            continue;
        }

        match build_session_with_providers(model_path, providers) {
            Ok(session) => return Ok(session),
            Err(error) => {
                tracing::warn!(
                    model_path,
                    %error,
                    "session creation failed, trying fallback providers"
                );
                errors.push(format!("{error}"));
            }
        }
    }

    if errors.is_empty() {
        return Err(MlError::InvalidRequest(
            "no execution provider selected while CPU fallback is disabled".to_string(),
        ));
    }

    Err(MlError::Ort(format!(
        "failed to create ONNX session for model '{model_path}' across EP fallbacks: {}",
        errors.join(" | ")
    )))
}

fn providers_for_policy(
    policy: &ExecutionProviderPolicy,
    include_accelerators: bool,
) -> Vec<ExecutionProviderDispatch> {
    let mut providers: Vec<ExecutionProviderDispatch> = Vec::new();

    if include_accelerators && policy.prefer_cuda {
        providers.push(CUDAExecutionProvider::default().build());
    }

    if policy.allow_cpu_fallback {
        if include_accelerators && policy.prefer_xnnpack {
            providers.push(XNNPACKExecutionProvider::default().build());
        }
        providers.push(
            CPUExecutionProvider::default()
                .with_arena_allocator()
                .build(),
        );
    }

    providers
}

fn build_session_with_providers(
    model_path: &str,
    providers: Vec<ExecutionProviderDispatch>,
) -> MlResult<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(1)?
        .with_inter_threads(1)?
        .with_execution_providers(providers)?
        .commit_from_file(model_path)?;
    Ok(session)
}

pub fn run_f32(
    session: &mut Session,
    input: Vec<f32>,
    input_shape: Vec<i64>,
) -> MlResult<(Vec<i64>, Vec<f32>)> {
    let input_tensor = Tensor::<f32>::from_array((input_shape, input))?;
    let outputs = session.run(ort::inputs![input_tensor]?)?;
    if outputs.is_empty() {
        return Err(MlError::Ort("missing first output tensor".to_string()));
    }
    let output = &outputs[0];
    let tensor = output.try_extract_tensor::<f32>()?;
    let shape = tensor.shape().iter().map(|d| *d as i64).collect::<Vec<_>>();
    let data = tensor.iter().copied().collect::<Vec<_>>();
    Ok((shape, data))
}
