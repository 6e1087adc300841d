//! WGSL shader compilation and binding reflection

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::{
    DescriptorBinding, DescriptorType, GpuDevice, RhiError, RhiResult, ShaderHandle,
    ShaderModuleDescriptor, ShaderStage, VertexType,
};

use super::RhiContext;

static NEXT_SHADER_ID: AtomicU64 = AtomicU64::new(1);

/// Compile-time constant injected ahead of the shader source.
///
/// Becomes `const NAME: u32 = VALUEu;`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderDefine {
    pub name: &'static str,
    pub value: u32,
}

impl ShaderDefine {
    pub const fn new(name: &'static str, value: u32) -> Self {
        Self { name, value }
    }
}

/// A compiled shader stage plus the resources it reads
pub struct Shader {
    id: u64,
    name: String,
    stage: ShaderStage,
    entry_point: String,
    vertex_type: VertexType,
    bindings: Vec<DescriptorBinding>,
    handle: ShaderHandle,
    device: Arc<dyn GpuDevice>,
}

impl Shader {
    pub fn compile(
        ctx: &RhiContext,
        name: &str,
        source: &str,
        stage: ShaderStage,
        entry_point: &str,
        vertex_type: VertexType,
        defines: &[ShaderDefine],
    ) -> RhiResult<Arc<Self>> {
        let source = with_defines(source, defines);

        let module = naga::front::wgsl::parse_str(&source).map_err(|e| {
            RhiError::ShaderCreationFailed(format!("{name}: WGSL parse error: {}", e.emit_to_string(&source)))
        })?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        let info = validator.validate(&module).map_err(|e| {
            RhiError::ShaderCreationFailed(format!("{name}: validation error: {e}"))
        })?;

        let naga_stage = naga_stage(stage);
        let entry_point_index = module
            .entry_points
            .iter()
            .position(|ep| ep.name == entry_point && ep.stage == naga_stage)
            .ok_or_else(|| {
                RhiError::ShaderCreationFailed(format!(
                    "{name}: entry point '{entry_point}' not found for stage {stage:?}"
                ))
            })?;

        let bindings = reflect_bindings(&module, info.get_entry_point(entry_point_index), stage);

        let device = ctx.device().clone();
        let handle = device.create_shader(&ShaderModuleDescriptor {
            label: name,
            module: &module,
            info: &info,
            stage,
            entry_point,
        })?;

        log::debug!(
            "Compiled shader {} ({:?}, {} bindings)",
            name,
            stage,
            bindings.len()
        );

        Ok(Arc::new(Self {
            id: NEXT_SHADER_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            stage,
            entry_point: entry_point.to_string(),
            vertex_type,
            bindings,
            handle,
            device,
        }))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    pub fn vertex_type(&self) -> VertexType {
        self.vertex_type
    }

    /// Group 0 bindings used by the entry point, sorted by binding number
    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    pub fn handle(&self) -> ShaderHandle {
        self.handle
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        self.device.destroy_shader(self.handle);
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("stage", &self.stage)
            .field("entry_point", &self.entry_point)
            .finish()
    }
}

fn with_defines(source: &str, defines: &[ShaderDefine]) -> String {
    let mut composed = String::with_capacity(source.len() + defines.len() * 32);
    for define in defines {
        composed.push_str(&format!("const {}: u32 = {}u;\n", define.name, define.value));
    }
    composed.push_str(source);
    composed
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    if stage.contains(ShaderStage::VERTEX) {
        naga::ShaderStage::Vertex
    } else if stage.contains(ShaderStage::PIXEL) {
        naga::ShaderStage::Fragment
    } else {
        naga::ShaderStage::Compute
    }
}

fn reflect_bindings(
    module: &naga::Module,
    function: &naga::valid::FunctionInfo,
    stage: ShaderStage,
) -> Vec<DescriptorBinding> {
    let mut bindings: Vec<DescriptorBinding> = module
        .global_variables
        .iter()
        .filter(|(handle, _)| !function[*handle].is_empty())
        .filter_map(|(_, variable)| {
            let binding = variable.binding.as_ref()?;
            if binding.group != 0 {
                return None;
            }
            let ty = match variable.space {
                naga::AddressSpace::Uniform => DescriptorType::ConstantBuffer,
                naga::AddressSpace::Storage { .. } => DescriptorType::StructuredBuffer,
                naga::AddressSpace::Handle => match module.types[variable.ty].inner {
                    naga::TypeInner::Image {
                        class: naga::ImageClass::Storage { .. },
                        ..
                    } => DescriptorType::StorageTexture,
                    naga::TypeInner::Image { .. } => DescriptorType::Texture,
                    naga::TypeInner::Sampler { .. } => DescriptorType::Sampler,
                    _ => return None,
                },
                _ => return None,
            };
            Some(DescriptorBinding {
                binding: binding.binding,
                ty,
                stages: stage,
            })
        })
        .collect();
    bindings.sort_by_key(|binding| binding.binding);
    bindings
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPUTE: &str = r#"
@group(0) @binding(100) var<uniform> frame: vec4<f32>;
@group(0) @binding(200) var tex_in: texture_2d<f32>;
@group(0) @binding(0) var tex_out: texture_storage_2d<rgba16float, write>;
@group(0) @binding(300) var sampler_point: sampler;
@group(0) @binding(201) var tex_unused: texture_2d<f32>;

@compute @workgroup_size(8, 8, 1)
fn main_cs(@builtin(global_invocation_id) id: vec3<u32>) {
    let color = textureSampleLevel(tex_in, sampler_point, vec2<f32>(0.5), 0.0) * frame.x * f32(SCALE);
    textureStore(tex_out, vec2<i32>(id.xy), color);
}
"#;

    fn parse(source: &str) -> (naga::Module, naga::valid::ModuleInfo) {
        let module = naga::front::wgsl::parse_str(source).unwrap();
        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .unwrap();
        (module, info)
    }

    #[test]
    fn test_defines_are_prepended() {
        let source = with_defines("fn f() {}", &[ShaderDefine::new("PASS", 1)]);
        assert!(source.starts_with("const PASS: u32 = 1u;\n"));
    }

    #[test]
    fn test_reflection_skips_unused_globals() {
        let source = with_defines(COMPUTE, &[ShaderDefine::new("SCALE", 2)]);
        let (module, info) = parse(&source);
        let bindings = reflect_bindings(&module, info.get_entry_point(0), ShaderStage::COMPUTE);

        let numbers: Vec<u32> = bindings.iter().map(|b| b.binding).collect();
        assert_eq!(numbers, vec![0, 100, 200, 300]);
        assert_eq!(bindings[0].ty, DescriptorType::StorageTexture);
        assert_eq!(bindings[1].ty, DescriptorType::ConstantBuffer);
        assert_eq!(bindings[2].ty, DescriptorType::Texture);
        assert_eq!(bindings[3].ty, DescriptorType::Sampler);
    }
}
