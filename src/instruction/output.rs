//! Where an operation's results go.
//!
//! One resolver per call, picked by calling convention. Functional calls
//! allocate, out calls reuse (resizing when needed) the caller's buffer, and
//! in-place calls must fit the receiver as it is. Whenever a borrowed buffer's
//! layout differs from the kernel's preferred one the kernel writes to a proxy
//! that is copied back afterwards.

use crate::instruction::meta::OutputDescriptor;
use crate::instruction::proxy::{copy_back, maybe_create_proxy};
use crate::tensor::{Tensor, TensorOptions};
use crate::utils::error::{Result, TensorError};

pub enum OutputResolver<'a> {
    /// Fresh outputs owned by the resolver until handed to the caller
    Allocate { outputs: Vec<Option<Tensor>> },
    /// Caller's out buffers, borrowed for the duration of the call
    ReuseOrResize {
        outputs: Vec<&'a mut Tensor>,
        proxies: Vec<Option<Tensor>>,
    },
    /// The receiver of an in-place call; its shape is fixed
    ValidateInPlace {
        outputs: Vec<&'a mut Tensor>,
        proxies: Vec<Option<Tensor>>,
    },
}

impl<'a> OutputResolver<'a> {
    pub fn allocate(num_outputs: usize) -> Self {
        Self::Allocate {
            outputs: (0..num_outputs).map(|_| None).collect(),
        }
    }

    pub fn reuse_or_resize(outputs: Vec<&'a mut Tensor>) -> Self {
        let proxies = outputs.iter().map(|_| None).collect();
        Self::ReuseOrResize { outputs, proxies }
    }

    pub fn validate_in_place(outputs: Vec<&'a mut Tensor>) -> Self {
        let proxies = outputs.iter().map(|_| None).collect();
        Self::ValidateInPlace { outputs, proxies }
    }

    /// Materialise `slot` for a kernel that wants `desc.strides`, proxying if needed.
    pub fn set_output(&mut self, slot: usize, desc: &OutputDescriptor) -> Result<()> {
        self.set_output_impl(slot, desc, true)
    }

    /// Materialise `slot` for a kernel that can write any layout. Never proxies.
    pub fn set_output_raw_strided(&mut self, slot: usize, desc: &OutputDescriptor) -> Result<()> {
        self.set_output_impl(slot, desc, false)
    }

    /// Send `slot` through a proxy when the caller's buffer partially overlaps
    /// one of `inputs`, so the kernel never reads an element it already wrote.
    pub fn isolate_from_inputs(&mut self, slot: usize, inputs: &[&Tensor]) -> Result<()> {
        let (outputs, proxies) = match self {
            Self::Allocate { .. } => return Ok(()),
            Self::ReuseOrResize { outputs, proxies } | Self::ValidateInPlace { outputs, proxies } => {
                (outputs, proxies)
            }
        };
        let out: &Tensor = outputs.get(slot).ok_or_else(|| slot_error(slot))?;
        let proxy = proxies.get_mut(slot).ok_or_else(|| slot_error(slot))?;
        if proxy.is_some() || !inputs.iter().any(|input| out.partially_overlaps(input)) {
            return Ok(());
        }
        tracing::debug!(slot, "out overlaps an input, writing through a proxy");
        let options = TensorOptions::new(out.dtype()).with_device(out.device());
        *proxy = Some(Tensor::empty(out.sizes(), &options)?);
        Ok(())
    }

    /// The tensor the kernel must write `slot` into: the proxy if one exists.
    pub fn resolve(&self, slot: usize) -> Result<&Tensor> {
        let resolved = match self {
            Self::Allocate { outputs } => outputs.get(slot).and_then(Option::as_ref),
            Self::ReuseOrResize { outputs, proxies }
            | Self::ValidateInPlace { outputs, proxies } => proxies
                .get(slot)
                .and_then(Option::as_ref)
                .or_else(|| outputs.get(slot).map(|out| &**out)),
        };
        resolved.ok_or_else(|| {
            TensorError::ContractViolation(format!("output slot {} was never set", slot))
        })
    }

    pub fn has_proxy(&self, slot: usize) -> bool {
        match self {
            Self::Allocate { .. } => false,
            Self::ReuseOrResize { proxies, .. } | Self::ValidateInPlace { proxies, .. } => {
                proxies.get(slot).is_some_and(Option::is_some)
            }
        }
    }

    /// Copy every proxy into its caller buffer and release it.
    ///
    /// Only call this after the kernel succeeded; on kernel failure the
    /// resolver is just dropped and the proxies with it.
    pub fn copy_back(&mut self) -> Result<()> {
        match self {
            Self::Allocate { .. } => Ok(()),
            Self::ReuseOrResize { outputs, proxies } | Self::ValidateInPlace { outputs, proxies } => {
                for (out, proxy) in outputs.iter_mut().zip(proxies.iter_mut()) {
                    if let Some(proxy) = proxy.take() {
                        copy_back(&proxy, out)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Hand the freshly allocated outputs to the caller.
    pub fn into_allocated(self) -> Result<Vec<Tensor>> {
        match self {
            Self::Allocate { outputs } => outputs
                .into_iter()
                .enumerate()
                .map(|(slot, out)| {
                    out.ok_or_else(|| {
                        TensorError::ContractViolation(format!("output slot {} was never set", slot))
                    })
                })
                .collect(),
            _ => Err(TensorError::ContractViolation(
                "only an allocating resolver owns its outputs".to_string(),
            )),
        }
    }

    fn set_output_impl(&mut self, slot: usize, desc: &OutputDescriptor, strided: bool) -> Result<()> {
        let options = &desc.options;
        match self {
            Self::Allocate { outputs } => {
                let entry = outputs.get_mut(slot).ok_or_else(|| slot_error(slot))?;
                let mut out = if desc.strides.is_empty() {
                    Tensor::empty(&desc.sizes, options)?
                } else {
                    Tensor::empty_strided(&desc.sizes, &desc.strides, options)?
                };
                out.set_names(desc.names.clone())?;
                tracing::trace!(slot, sizes = ?desc.sizes, "allocated output");
                *entry = Some(out);
            }
            Self::ReuseOrResize { outputs, proxies } => {
                let out: &mut Tensor = outputs.get_mut(slot).ok_or_else(|| slot_error(slot))?;
                check_dtype_and_device(out, desc)?;

                let resized = out.resize_output(&desc.sizes)?;
                // A buffer that already had the right shape keeps the caller's layout
                if resized {
                    if !desc.strides.is_empty() {
                        out.as_strided_(&desc.sizes, &desc.strides, None)?;
                    } else if let Some(format) = options.memory_format() {
                        out.restride(format)?;
                    }
                    tracing::debug!(slot, sizes = ?desc.sizes, strides = ?out.strides(), "resized out");
                }

                if strided {
                    proxies[slot] = maybe_create_proxy(out, &desc.sizes, &desc.strides, options)?;
                }
                if desc.names.is_some() {
                    out.set_names(desc.names.clone())?;
                }
            }
            Self::ValidateInPlace { outputs, proxies } => {
                let out: &mut Tensor = outputs.get_mut(slot).ok_or_else(|| slot_error(slot))?;
                check_dtype_and_device(out, desc)?;
                if out.sizes() != desc.sizes.as_slice() {
                    return Err(TensorError::InPlaceShapeViolation {
                        expected: desc.sizes.clone(),
                        found: out.sizes().to_vec(),
                    });
                }

                if strided {
                    proxies[slot] = maybe_create_proxy(out, &desc.sizes, &desc.strides, options)?;
                }
                if desc.names.is_some() {
                    out.set_names(desc.names.clone())?;
                }
            }
        }
        Ok(())
    }
}

fn slot_error(slot: usize) -> TensorError {
    TensorError::ContractViolation(format!("output slot {} out of range", slot))
}

fn check_dtype_and_device(out: &Tensor, desc: &OutputDescriptor) -> Result<()> {
    let expected = desc.options.dtype();
    if out.dtype() != expected {
        return Err(TensorError::DtypeMismatch {
            expected,
            found: out.dtype(),
        });
    }
    let expected = desc.options.device();
    if out.device() != expected {
        return Err(TensorError::DeviceMismatch {
            expected,
            found: out.device(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{DataType, MemoryFormat};

    fn float_desc(sizes: &[usize]) -> OutputDescriptor {
        let strides = crate::tensor::TensorDesc::compute_strides(sizes);
        OutputDescriptor::new(sizes.to_vec(), TensorOptions::new(DataType::Float)).with_strides(strides)
    }

    #[test]
    fn test_allocate() {
        let mut resolver = OutputResolver::allocate(1);
        assert!(resolver.resolve(0).is_err());
        resolver.set_output(0, &float_desc(&[2, 3])).unwrap();
        assert_eq!(resolver.resolve(0).unwrap().sizes(), &[2, 3]);
        assert!(!resolver.has_proxy(0));

        let outputs = resolver.into_allocated().unwrap();
        assert_eq!(outputs.len(), 1);
        assert!(outputs[0].is_contiguous());
    }

    #[test]
    fn test_allocate_without_advisory_strides_uses_format_hint() {
        let options = TensorOptions::new(DataType::Float).with_memory_format(MemoryFormat::ChannelsLast);
        let desc = OutputDescriptor::new(vec![1, 2, 2, 2], options);
        let mut resolver = OutputResolver::allocate(1);
        resolver.set_output(0, &desc).unwrap();
        assert_eq!(resolver.resolve(0).unwrap().strides(), &[8, 1, 4, 2]);
    }

    #[test]
    fn test_reuse_checks_dtype_before_touching_out() {
        let mut out = Tensor::zeros(&[5], &TensorOptions::new(DataType::Int64)).unwrap();
        {
            let mut resolver = OutputResolver::reuse_or_resize(vec![&mut out]);
            assert_eq!(
                resolver.set_output(0, &float_desc(&[2, 3])).unwrap_err(),
                TensorError::DtypeMismatch {
                    expected: DataType::Float,
                    found: DataType::Int64
                }
            );
        }
        assert_eq!(out.sizes(), &[5]);
    }

    #[test]
    fn test_reuse_resizes_and_applies_advisory_strides() {
        let mut out = Tensor::zeros(&[0], &TensorOptions::new(DataType::Float)).unwrap();
        let desc = float_desc(&[2, 3]).with_strides(vec![1, 2]);
        {
            let mut resolver = OutputResolver::reuse_or_resize(vec![&mut out]);
            resolver.set_output(0, &desc).unwrap();
            // resized buffers take the advisory layout, so no proxy
            assert!(!resolver.has_proxy(0));
            resolver.copy_back().unwrap();
        }
        assert_eq!(out.sizes(), &[2, 3]);
        assert_eq!(out.strides(), &[1, 2]);
    }

    #[test]
    fn test_reuse_keeps_layout_of_correctly_shaped_out() {
        let mut out = Tensor::zeros(&[3, 2], &TensorOptions::new(DataType::Float))
            .unwrap()
            .transpose(0, 1)
            .unwrap();
        {
            let mut resolver = OutputResolver::reuse_or_resize(vec![&mut out]);
            resolver.set_output(0, &float_desc(&[2, 3])).unwrap();
            assert!(resolver.has_proxy(0));
            assert!(resolver.resolve(0).unwrap().is_contiguous());
        }
        assert_eq!(out.strides(), &[1, 2]);
    }

    #[test]
    fn test_resized_out_takes_format_hint_without_advisory_strides() {
        let options = TensorOptions::new(DataType::Float).with_memory_format(MemoryFormat::ChannelsLast);
        let desc = OutputDescriptor::new(vec![1, 2, 2, 2], options);
        let mut out = Tensor::zeros(&[3], &TensorOptions::new(DataType::Float)).unwrap();
        {
            let mut resolver = OutputResolver::reuse_or_resize(vec![&mut out]);
            resolver.set_output(0, &desc).unwrap();
            assert!(!resolver.has_proxy(0));
            assert_eq!(resolver.resolve(0).unwrap().strides(), &[8, 1, 4, 2]);
        }
        assert_eq!(out.sizes(), &[1, 2, 2, 2]);
        assert_eq!(out.suggest_memory_format(), MemoryFormat::ChannelsLast);
    }

    #[test]
    fn test_overlapping_out_is_isolated() {
        let base = Tensor::from_slice(&[4], &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let input = base.as_strided(&[3], &[1], Some(0)).unwrap();
        let mut out = base.as_strided(&[3], &[1], Some(1)).unwrap();
        let desc = float_desc(&[3]);

        let mut resolver = OutputResolver::reuse_or_resize(vec![&mut out]);
        resolver.set_output(0, &desc).unwrap();
        assert!(!resolver.has_proxy(0));
        resolver.isolate_from_inputs(0, &[&input]).unwrap();
        assert!(resolver.has_proxy(0));
        assert!(!resolver.resolve(0).unwrap().is_same_storage(&base));

        // the receiver itself is read before each write, so no proxy
        let mut receiver = input.clone();
        let mut resolver = OutputResolver::validate_in_place(vec![&mut receiver]);
        resolver.set_output(0, &desc).unwrap();
        resolver.isolate_from_inputs(0, &[&input]).unwrap();
        assert!(!resolver.has_proxy(0));
    }

    #[test]
    fn test_raw_strided_never_proxies() {
        let mut out = Tensor::zeros(&[3, 2], &TensorOptions::new(DataType::Float))
            .unwrap()
            .transpose(0, 1)
            .unwrap();
        let mut resolver = OutputResolver::reuse_or_resize(vec![&mut out]);
        resolver.set_output_raw_strided(0, &float_desc(&[2, 3])).unwrap();
        assert!(!resolver.has_proxy(0));
        assert_eq!(resolver.resolve(0).unwrap().strides(), &[1, 2]);
    }

    #[test]
    fn test_in_place_rejects_shape_change() {
        let mut a = Tensor::zeros(&[3], &TensorOptions::new(DataType::Float)).unwrap();
        let mut resolver = OutputResolver::validate_in_place(vec![&mut a]);
        assert_eq!(
            resolver.set_output(0, &float_desc(&[2, 3])).unwrap_err(),
            TensorError::InPlaceShapeViolation {
                expected: vec![2, 3],
                found: vec![3]
            }
        );
    }

    #[test]
    fn test_names_go_to_out_not_proxy() {
        let mut out = Tensor::zeros(&[3, 2], &TensorOptions::new(DataType::Float))
            .unwrap()
            .transpose(0, 1)
            .unwrap();
        let names = Some(vec![Some("N".to_string()), None]);
        {
            let mut resolver = OutputResolver::reuse_or_resize(vec![&mut out]);
            resolver
                .set_output(0, &float_desc(&[2, 3]).with_names(names.clone()))
                .unwrap();
            assert!(resolver.resolve(0).unwrap().names().is_none());
        }
        assert_eq!(out.names(), names.as_deref());
    }
}
