use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

const GIB: u64 = 1024 * 1024 * 1024;
const GPU_PROVIDERS: [&str; 4] = ["cuda", "tensorrt", "rocm", "coreml"];
const GPU_EXECUTION_THREADS: usize = 8;

/// Host-derived execution budget.
pub trait HostIntrospection: Send + Sync {
    fn suggest_max_memory_bytes(&self) -> u64;
    fn suggest_execution_threads(&self, providers: &[String]) -> usize;
}

/// Reads memory and CPU figures from the running machine.
pub struct SystemHost {
    memory_ceiling_bytes: u64,
}

impl SystemHost {
    pub fn new(memory_ceiling_gib: u64) -> Self {
        Self {
            memory_ceiling_bytes: memory_ceiling_gib.max(1) * GIB,
        }
    }
}

impl HostIntrospection for SystemHost {
    fn suggest_max_memory_bytes(&self) -> u64 {
        let system = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        memory_budget(system.available_memory(), self.memory_ceiling_bytes)
    }

    fn suggest_execution_threads(&self, providers: &[String]) -> usize {
        if uses_gpu(providers) {
            return GPU_EXECUTION_THREADS;
        }
        let system =
            System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::new()));
        system.cpus().len().max(1)
    }
}

/// Three quarters of the available memory, capped by the ceiling and never
/// below one GiB.
pub fn memory_budget(available_bytes: u64, ceiling_bytes: u64) -> u64 {
    (available_bytes / 4 * 3).min(ceiling_bytes).max(GIB)
}

pub fn uses_gpu(providers: &[String]) -> bool {
    providers
        .iter()
        .any(|p| GPU_PROVIDERS.contains(&p.as_str()))
}

/// `CUDAExecutionProvider` -> `cuda`.
pub fn encode_provider(name: &str) -> String {
    name.replace("ExecutionProvider", "").to_lowercase()
}

/// Resolves requested accelerators against what the runtime exposes, keeping
/// request order. Unknown requests are dropped. Never returns an empty list:
/// when nothing matches, the first available provider (or `cpu`) is used.
pub fn resolve_execution_providers(requested: &[String], available: &[String]) -> Vec<String> {
    let available: Vec<String> = available.iter().map(|p| encode_provider(p)).collect();
    let mut resolved: Vec<String> = Vec::new();

    for request in requested {
        let request = request.trim().to_lowercase();
        if request.is_empty() {
            continue;
        }
        for candidate in available.iter().filter(|a| a.contains(&request)) {
            if !resolved.contains(candidate) {
                resolved.push(candidate.clone());
            }
        }
    }

    if resolved.is_empty() {
        let fallback = available.first().cloned().unwrap_or_else(|| "cpu".to_string());
        log::warn!(
            "None of the requested execution providers {:?} are available, falling back to {}",
            requested,
            fallback
        );
        resolved.push(fallback);
    }

    resolved
}
