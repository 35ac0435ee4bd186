use kube::ResourceExt;

/// A versioned remote entity the reflector can mirror.
///
/// Implemented for every `kube::Resource` type via the blanket impl below, so
/// k8s-openapi models and derived CRD types work unmodified.
pub trait WatchedResource: Clone + Send + Sync + 'static {
    /// Kind/type tag, used for diagnostics only
    fn kind_name(&self) -> String;

    /// Object name
    fn name(&self) -> String;

    /// Object namespace, `None` for cluster-scoped resources
    fn namespace(&self) -> Option<String>;

    /// Opaque server-assigned version marker, `None` if the server
    /// never populated it
    fn resource_version(&self) -> Option<String>;
}

impl<K> WatchedResource for K
where
    K: kube::Resource + Clone + Send + Sync + 'static,
    K::DynamicType: Default,
{
    fn kind_name(&self) -> String {
        K::kind(&K::DynamicType::default()).into_owned()
    }

    fn name(&self) -> String {
        self.name_any()
    }

    fn namespace(&self) -> Option<String> {
        ResourceExt::namespace(self)
    }

    fn resource_version(&self) -> Option<String> {
        ResourceExt::resource_version(self)
    }
}
