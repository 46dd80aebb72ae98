//! Command signatures for indirect execution.
//!
//! A signature describes the layout of one record in an indirect argument
//! buffer: optional root constant and vertex/index buffer overrides followed
//! by exactly one draw or dispatch argument block.

use crate::context::RendererContext;
use crate::error::{GraphicsError, GraphicsResult};
use crate::handle::ResourceId;
use crate::root_signature::RootSignature;
use crate::types::{
    DescriptorType, IndirectDispatchArguments, IndirectDrawArguments, IndirectDrawIndexArguments,
};

/// Record stride alignment of non-packed signatures.
pub const INDIRECT_ARGUMENT_ALIGNMENT: u32 = 16;

/// Size of a vertex or index buffer override (GPU address, size, stride/format).
const BUFFER_VIEW_ARGUMENT_SIZE: u32 = 16;

/// One element of an indirect record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndirectArgument<'a> {
    Draw,
    DrawIndex,
    Dispatch,
    /// `count` 32-bit values written into the named root constant.
    Constant { name: &'a str, count: u32 },
    VertexBuffer { binding: u32 },
    IndexBuffer,
}

impl IndirectArgument<'_> {
    fn size(&self) -> u32 {
        match self {
            Self::Constant { count, .. } => 4 * count,
            Self::VertexBuffer { .. } | Self::IndexBuffer => BUFFER_VIEW_ARGUMENT_SIZE,
            _ => self.command_type().map_or(0, IndirectCommandType::argument_size),
        }
    }

    fn command_type(&self) -> Option<IndirectCommandType> {
        match self {
            Self::Draw => Some(IndirectCommandType::Draw),
            Self::DrawIndex => Some(IndirectCommandType::DrawIndexed),
            Self::Dispatch => Some(IndirectCommandType::Dispatch),
            _ => None,
        }
    }
}

/// The work a signature issues per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndirectCommandType {
    Draw,
    DrawIndexed,
    Dispatch,
}

impl IndirectCommandType {
    pub fn is_draw(self) -> bool {
        matches!(self, Self::Draw | Self::DrawIndexed)
    }

    /// Size of the argument block read per record.
    pub fn argument_size(self) -> u32 {
        match self {
            Self::Draw => IndirectDrawArguments::SIZE as u32,
            Self::DrawIndexed => IndirectDrawIndexArguments::SIZE as u32,
            Self::Dispatch => IndirectDispatchArguments::SIZE as u32,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CommandSignatureDesc<'a> {
    /// Needed only when the signature contains constants.
    pub root_signature: Option<&'a RootSignature>,
    pub arguments: &'a [IndirectArgument<'a>],
    /// Skip rounding the stride up to [`INDIRECT_ARGUMENT_ALIGNMENT`].
    pub packed: bool,
}

impl<'a> CommandSignatureDesc<'a> {
    pub fn new(arguments: &'a [IndirectArgument<'a>]) -> Self {
        Self {
            root_signature: None,
            arguments,
            packed: false,
        }
    }

    pub fn with_root_signature(mut self, root_signature: &'a RootSignature) -> Self {
        self.root_signature = Some(root_signature);
        self
    }

    pub fn packed(mut self) -> Self {
        self.packed = true;
        self
    }
}

/// Layout of an indirect argument record.
#[derive(Debug)]
pub struct CommandSignature {
    id: ResourceId,
    command_type: IndirectCommandType,
    stride: u32,
    args_offset: u32,
    argument_count: usize,
    /// Root constant descriptor indices written by the record.
    constants: Vec<u32>,
}

impl CommandSignature {
    pub(crate) fn create(context: &RendererContext, desc: &CommandSignatureDesc<'_>) -> GraphicsResult<Self> {
        let invalid = |message: String| Err(GraphicsError::InvalidParameter(message));
        let Some((last, prefix)) = desc.arguments.split_last() else {
            return invalid("command signature has no arguments".to_string());
        };
        let Some(command_type) = last.command_type() else {
            return invalid(format!("last indirect argument must be a draw or dispatch, got {last:?}"));
        };

        let mut args_offset = 0u32;
        let mut constants = Vec::new();
        for argument in prefix {
            match argument {
                IndirectArgument::Draw | IndirectArgument::DrawIndex | IndirectArgument::Dispatch => {
                    return invalid("only one draw or dispatch argument is allowed".to_string());
                }
                IndirectArgument::VertexBuffer { .. } | IndirectArgument::IndexBuffer
                    if command_type == IndirectCommandType::Dispatch =>
                {
                    return invalid("dispatch signatures cannot override vertex or index buffers".to_string());
                }
                IndirectArgument::VertexBuffer { binding }
                    if *binding >= context.settings.max_vertex_input_bindings =>
                {
                    return invalid(format!("vertex buffer binding {binding} out of range"));
                }
                IndirectArgument::Constant { name, count } => {
                    if *count == 0 {
                        return invalid(format!("constant '{name}' has zero values"));
                    }
                    let Some(root_signature) = desc.root_signature else {
                        return invalid(format!("constant '{name}' needs a root signature"));
                    };
                    let index = root_signature
                        .descriptor_index(name)
                        .filter(|&i| {
                            root_signature
                                .descriptor(i)
                                .is_some_and(|d| d.descriptor_type == DescriptorType::ROOT_CONSTANT)
                        });
                    let Some(index) = index else {
                        return invalid(format!("'{name}' is not a root constant"));
                    };
                    constants.push(index);
                }
                _ => {}
            }
            args_offset += argument.size();
        }

        let mut stride = args_offset + last.size();
        if !desc.packed {
            stride = stride.next_multiple_of(INDIRECT_ARGUMENT_ALIGNMENT);
        }

        let id = context.ids.next_id();
        log::trace!("CommandSignature: created {id} ({command_type:?}, stride {stride})");
        Ok(Self {
            id,
            command_type,
            stride,
            args_offset,
            argument_count: desc.arguments.len(),
            constants,
        })
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn command_type(&self) -> IndirectCommandType {
        self.command_type
    }

    /// Bytes between consecutive records.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Offset of the draw/dispatch block inside a record.
    pub fn args_offset(&self) -> u32 {
        self.args_offset
    }

    pub fn argument_count(&self) -> usize {
        self.argument_count
    }

    pub fn constant_indices(&self) -> &[u32] {
        &self.constants
    }
}

static_assertions::assert_impl_all!(CommandSignature: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::null_context;
    use crate::shader::{BinaryShaderDesc, BinaryShaderStageDesc, Shader, ShaderReflection, ShaderResource, ShaderStage};
    use crate::root_signature::RootSignatureDesc;

    #[test]
    fn test_stride_alignment() {
        let context = null_context();
        let draw = CommandSignature::create(&context, &CommandSignatureDesc::new(&[IndirectArgument::DrawIndex]))
            .unwrap();
        assert_eq!(draw.command_type(), IndirectCommandType::DrawIndexed);
        assert_eq!(draw.stride(), 32);
        assert_eq!(draw.args_offset(), 0);

        let packed = CommandSignature::create(
            &context,
            &CommandSignatureDesc::new(&[IndirectArgument::Dispatch]).packed(),
        )
        .unwrap();
        assert_eq!(packed.stride(), 12);
    }

    #[test]
    fn test_argument_ordering_rules() {
        let context = null_context();
        let draw_not_last = [IndirectArgument::Draw, IndirectArgument::IndexBuffer];
        assert!(CommandSignature::create(&context, &CommandSignatureDesc::new(&draw_not_last)).is_err());

        let two_draws = [IndirectArgument::Draw, IndirectArgument::Draw];
        assert!(CommandSignature::create(&context, &CommandSignatureDesc::new(&two_draws)).is_err());

        let dispatch_with_vb = [IndirectArgument::VertexBuffer { binding: 0 }, IndirectArgument::Dispatch];
        assert!(CommandSignature::create(&context, &CommandSignatureDesc::new(&dispatch_with_vb)).is_err());

        let draw_with_vb = [IndirectArgument::VertexBuffer { binding: 0 }, IndirectArgument::Draw];
        let signature = CommandSignature::create(&context, &CommandSignatureDesc::new(&draw_with_vb)).unwrap();
        assert_eq!(signature.args_offset(), 16);
        assert_eq!(signature.stride(), 32);

        assert!(CommandSignature::create(&context, &CommandSignatureDesc::new(&[])).is_err());
    }

    #[test]
    fn test_constants_resolve_against_root_signature() {
        let context = null_context();
        let reflection = ShaderReflection::new(ShaderStage::VERT)
            .with_resource(ShaderResource::root_constant("drawId", 4));
        let shader = Shader::create(
            &context,
            &BinaryShaderDesc::new("indirect")
                .with_stage(BinaryShaderStageDesc::new(ShaderStage::VERT, vec![0u8; 4]).with_reflection(reflection)),
        )
        .unwrap();
        let rs = RootSignature::create(&context, &RootSignatureDesc::new(&[&shader])).unwrap();

        let arguments = [IndirectArgument::Constant { name: "drawId", count: 1 }, IndirectArgument::Draw];
        assert!(CommandSignature::create(&context, &CommandSignatureDesc::new(&arguments)).is_err());

        let signature = CommandSignature::create(
            &context,
            &CommandSignatureDesc::new(&arguments).with_root_signature(&rs),
        )
        .unwrap();
        assert_eq!(signature.args_offset(), 4);
        assert_eq!(signature.stride(), 32);
        assert_eq!(signature.constant_indices().len(), 1);

        let unknown = [IndirectArgument::Constant { name: "missing", count: 1 }, IndirectArgument::Draw];
        assert!(CommandSignature::create(&context, &CommandSignatureDesc::new(&unknown).with_root_signature(&rs))
            .is_err());
    }
}
