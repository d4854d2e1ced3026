//! Declarative pass description

use super::Condition;
use crate::command::RenderPassFlag;
use crate::device::{BlendMode, ClearFlags, ClearValues, CullMode, DepthFunc, Viewport};
use crate::target::PixelFormat;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PassType {
    Shadow,
    Skybox,
    Geometry,
    /// Lighting / combine of the G-buffer
    Base,
    Transparent,
    PostProcess,
    FullScreen,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassState {
    Disabled,
    Enabled,
    /// Runs only in frames where the condition holds
    Conditional(Condition),
}

/// A texture the pass samples, produced by another pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassInput {
    /// Name the pass binds the texture under
    pub name: String,
    pub source_pass: String,
    /// Output name on the source pass
    pub source_target: String,
    pub required: bool,
}

/// A render target the pass produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutput {
    /// Name other passes refer to in `PassInput::source_target`
    pub name: String,
    /// Name of the image inside the pass framebuffer
    pub target: String,
    pub format: PixelFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassDependency {
    pub pass: String,
    pub required: bool,
    pub condition: Condition,
}

/// Everything a pass declares before initialization
#[derive(Debug, Clone)]
pub struct RenderPassConfig {
    /// Unique across a manager
    pub name: String,
    pub pass_type: PassType,
    pub state: PassState,
    pub inputs: Vec<PassInput>,
    pub outputs: Vec<PassOutput>,
    pub dependencies: Vec<PassDependency>,
    pub clear: ClearFlags,
    pub clear_values: ClearValues,
    /// Fixed framebuffer size; takes precedence over the view size
    pub viewport: Option<Viewport>,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_func: DepthFunc,
    pub blend: Option<BlendMode>,
    pub cull: CullMode,
    /// Commands sharing any of these flags are drawn by the pass
    pub flags: RenderPassFlag,
}

impl RenderPassConfig {
    pub fn new(name: impl Into<String>, pass_type: PassType) -> Self {
        Self {
            name: name.into(),
            pass_type,
            state: PassState::Enabled,
            inputs: Vec::new(),
            outputs: Vec::new(),
            dependencies: Vec::new(),
            clear: ClearFlags::empty(),
            clear_values: ClearValues::default(),
            viewport: None,
            depth_test: true,
            depth_write: true,
            depth_func: DepthFunc::Less,
            blend: None,
            cull: CullMode::Back,
            flags: RenderPassFlag::empty(),
        }
    }

    pub fn with_state(mut self, state: PassState) -> Self {
        self.state = state;
        self
    }

    pub fn with_input(
        mut self,
        name: impl Into<String>,
        source_pass: impl Into<String>,
        source_target: impl Into<String>,
        required: bool,
    ) -> Self {
        self.inputs.push(PassInput {
            name: name.into(),
            source_pass: source_pass.into(),
            source_target: source_target.into(),
            required,
        });
        self
    }

    /// Output whose framebuffer image carries the same name
    pub fn with_output(mut self, name: impl Into<String>, format: PixelFormat) -> Self {
        let name = name.into();
        self.outputs.push(PassOutput {
            target: name.clone(),
            name,
            format,
        });
        self
    }

    pub fn with_dependency(self, pass: impl Into<String>, required: bool) -> Self {
        self.with_conditional_dependency(pass, required, Condition::Always)
    }

    pub fn with_conditional_dependency(mut self, pass: impl Into<String>, required: bool, condition: Condition) -> Self {
        self.dependencies.push(PassDependency {
            pass: pass.into(),
            required,
            condition,
        });
        self
    }

    pub fn with_clear(mut self, clear: ClearFlags, values: ClearValues) -> Self {
        self.clear = clear;
        self.clear_values = values;
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn with_depth(mut self, test: bool, write: bool, func: DepthFunc) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self.depth_func = func;
        self
    }

    pub fn with_blend(mut self, blend: Option<BlendMode>) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_cull(mut self, cull: CullMode) -> Self {
        self.cull = cull;
        self
    }

    pub fn with_flags(mut self, flags: RenderPassFlag) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_disabled(&self) -> bool {
        self.state == PassState::Disabled
    }

    pub fn input(&self, name: &str) -> Option<&PassInput> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&PassOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn depends_on(&self, pass: &str) -> bool {
        self.dependencies.iter().any(|d| d.pass == pass)
    }
}
