//! §4.9 Browse Helper — a uniform, one-shot forward-hierarchical browse.

use opcua::types::{
    BrowseDescription, BrowseDirection, BrowseResult, NodeClassMask, NodeId,
    ReferenceTypeId, ResultMask, StatusCode,
};

use crate::wire::WireSession;

/// One child reference returned by [`browse_children`], already filtered to
/// Object/Variable node classes.
#[derive(Debug, Clone)]
pub struct ChildReference {
    pub browse_name: String,
    pub node_id: NodeId,
    pub is_variable: bool,
}

/// Forward browse of `parent` for hierarchical references to Object/Variable
/// children, per §4.9. A bad browse status degrades to an empty result rather than
/// an error — callers (the Subject Loader, the Structural Change Processor) treat
/// "no children" uniformly whether that's because there really are none or because
/// the browse failed (§7).
pub async fn browse_children(
    session: &dyn WireSession,
    parent: &NodeId,
) -> Vec<ChildReference> {
    let description = BrowseDescription {
        node_id: parent.clone(),
        browse_direction: BrowseDirection::Forward,
        reference_type_id: ReferenceTypeId::HierarchicalReferences.into(),
        include_subtypes: true,
        node_class_mask: (NodeClassMask::OBJECT | NodeClassMask::VARIABLE).bits(),
        result_mask: ResultMask::all().bits(),
    };

    let results = match session.browse(&[description], 0).await {
        Ok(r) => r,
        Err(_) => return Vec::new(),
    };

    flatten(results)
}

fn flatten(results: Vec<BrowseResult>) -> Vec<ChildReference> {
    let mut out = Vec::new();
    for result in results {
        if result.status_code.is_bad() {
            continue;
        }
        for reference in result.references.into_iter().flatten() {
            let node_id = reference.node_id.node_id.clone();
            let browse_name = reference.browse_name.name.as_ref().to_string();
            let is_variable = reference.node_class == opcua::types::NodeClass::Variable;
            out.push(ChildReference {
                browse_name,
                node_id,
                is_variable,
            });
        }
    }
    out
}
