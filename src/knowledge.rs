//! 内置知识语料与集合初始化
//!
//! 集合划分：knowledge（部署规则）、equipment（装备射程）、executions（执行历史，
//! 容量受限）、tasks（历史任务）。seed_collections 幂等：已有对应类型数据的集合
//! 不重复写入。修改规则文本后重新初始化即可（删除旧集合数据由调用方决定）。

use std::collections::HashMap;
use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::AgentError;
use crate::store::{KnowledgeEntry, KnowledgeStore};

/// 部署规则集合
pub const COLLECTION_KNOWLEDGE: &str = "knowledge";
/// 装备信息集合
pub const COLLECTION_EQUIPMENT: &str = "equipment";
/// 执行历史集合（容量受限）
pub const COLLECTION_EXECUTIONS: &str = "executions";
/// 历史任务集合
pub const COLLECTION_TASKS: &str = "tasks";

/// 已知作战单位名称：检索路由与关键词抽取的实体词表
pub const KNOWN_UNITS: &[&str] = &[
    "轻步兵",
    "重装步兵",
    "机械化步兵",
    "坦克部队",
    "反坦克步兵",
    "自行火炮",
    "牵引火炮",
    "防空部队",
    "狙击手",
    "特种部队",
    "装甲侦察单位",
    "工兵部队",
    "后勤保障部队",
    "指挥单位",
    "无人机侦察控制单元",
];

/// 种子条目：文本 + 元数据键值对
struct Seed {
    text: &'static str,
    metadata: &'static [(&'static str, &'static str)],
}

impl Seed {
    fn metadata_map(&self) -> HashMap<String, String> {
        self.metadata
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

/// 军事单位部署规则（knowledge 集合）
const DEPLOYMENT_RULES: &[Seed] = &[
    Seed {
        text: "轻步兵适合部署在中等高程区域，地形起伏不大，坡度以缓坡或平缓地形为主。区域内宜具备中等覆盖度的天然植被，如灌木、零散乔木或混合草木带，以提供隐蔽与机动掩护，同时避免过密植被影响快速展开。配置位置应与居民区保持100-300米的缓冲距离，既能避免直接暴露于民用区域，又便于利用建筑边缘与自然掩体展开机动作战。",
        metadata: &[("unit", "轻步兵"), ("type", "deployment_rule")],
    },
    Seed {
        text: "重装步兵适合配置在较低至中等高程的防御阵地，坡度不宜过大，以平缓或中等坡度为宜。部署区域植被覆盖度宜为低至中等水平，以保证火力与人员展开空间，同时可利用林缘、矮灌木带作为遮蔽。部署位置通常与居民区保持200-500米缓冲距离，确保火力展开空间，同时避免对居民区造成直接影响。",
        metadata: &[("unit", "重装步兵"), ("type", "deployment_rule")],
    },
    Seed {
        text: "机械化步兵更适合部署在中等高程的过渡地带，坡度应保持在低至中等坡度范围，以保障装甲车辆通行。植被类型以稀疏林地、草地或农田边缘为宜，避免密林或高密度灌丛阻碍车辆机动。配置位置与居民区的缓冲距离建议控制在300-600米之间，兼顾快速机动与战场安全。",
        metadata: &[("unit", "机械化步兵"), ("type", "deployment_rule")],
    },
    Seed {
        text: "坦克部队适合部署在低至中等高程的开阔区域，整体坡度应尽量平缓，避免复杂起伏影响机动。植被应以低矮草地、稀疏灌木或已清理区域为主，确保视野与机动空间，避免高大乔木密集分布。配置位置通常要求与居民区保持500-1000米缓冲距离，减少城市地形对装甲单位的限制。",
        metadata: &[("unit", "坦克部队"), ("type", "deployment_rule")],
    },
    Seed {
        text: "反坦克步兵适合部署在中等至较高高程的伏击位置，坡度可为中等坡度或局部陡坡，便于形成俯射角度。部署区域宜具备较高植被隐蔽度，如林缘、灌木带或起伏草丛，以隐藏阵位并削弱目标发现概率。与居民区之间应保持150-400米缓冲距离，既能隐蔽部署，又不靠近高密度民用区域。",
        metadata: &[("unit", "反坦克步兵"), ("type", "deployment_rule")],
    },
    Seed {
        text: "自行火炮通常部署在中等高程或背坡地形，坡度以缓坡为主，利于火炮稳定展开。周边植被以低矮草木或零散乔木为宜，既可提供一定遮蔽，又不影响射界与后勤保障。配置位置与居民区应保持600-1000米缓冲距离，以确保安全并减少反侦察风险。",
        metadata: &[("unit", "自行火炮"), ("type", "deployment_rule")],
    },
    Seed {
        text: "牵引火炮适合配置在相对固定的中低高程阵地，地形坡度应较小且稳定。植被条件宜为低覆盖度或可控清理区域，便于长期部署、火炮调整及补给通行。与居民区的缓冲距离一般控制在400-800米之间，确保持续火力覆盖而不干扰民用区域。",
        metadata: &[("unit", "牵引火炮"), ("type", "deployment_rule")],
    },
    Seed {
        text: "防空部队适合部署在中等至较高高程位置，坡度以平缓或中等坡度为宜，保证雷达与火力视野。部署区域植被应以低矮或间断分布为主，避免高大连续林冠遮挡探测与射界。部署点与居民区的缓冲距离建议为300-700米，既保证空域覆盖，又降低暴露风险。",
        metadata: &[("unit", "防空部队"), ("type", "deployment_rule")],
    },
    Seed {
        text: "狙击手适合配置在较高高程制高点，局部坡度可为中等或陡坡，形成良好射界。区域内宜具备高隐蔽度植被条件，如林缘、灌木丛或不规则草木覆盖，以支持隐蔽观察与伪装。配置位置通常与居民区保持50-200米缓冲距离，便于利用城市边缘地形进行隐蔽观察。",
        metadata: &[("unit", "狙击手"), ("type", "deployment_rule")],
    },
    Seed {
        text: "特种部队适合部署在高程变化明显的复杂地形，坡度可从缓坡到陡坡不等，以增加行动隐蔽性。区域宜具备多样化植被类型，如混合林地、灌木与草地交错分布，以增强掩护与路线选择灵活性。与居民区之间宜保持200-500米缓冲距离，确保渗透行动不暴露于高密度区域。",
        metadata: &[("unit", "特种部队"), ("type", "deployment_rule")],
    },
    Seed {
        text: "装甲侦察单位适合部署在中低高程区域，整体坡度应较为平缓，便于快速进出。植被条件宜为稀疏分布，既可提供一定遮蔽，又不影响高速机动与观察能力。配置位置与居民区的缓冲距离一般为300-600米，以降低被发现概率。",
        metadata: &[("unit", "装甲侦察单位"), ("type", "deployment_rule")],
    },
    Seed {
        text: "工兵部队多部署在中低高程的关键节点区域，坡度应相对平缓，方便工程作业。区域内植被覆盖度宜适中或可清理，避免密集林木影响施工、铺设与通行。与居民区保持100-400米缓冲距离，既便于保障基础设施，又避免过度靠近居民区。",
        metadata: &[("unit", "工兵部队"), ("type", "deployment_rule")],
    },
    Seed {
        text: "后勤保障部队适合部署在低高程、安全区域，坡度应平缓稳定，便于物资运输。植被类型以低矮、通行性良好的草地或人工整备区域为宜，确保运输线路畅通。配置位置通常与居民区保持500-1000米缓冲距离，减少战场干扰风险。",
        metadata: &[("unit", "后勤保障部队"), ("type", "deployment_rule")],
    },
    Seed {
        text: "指挥单位适合部署在中等高程、地形相对隐蔽的位置，坡度以缓坡或平台地形为宜。周边植被宜形成自然遮蔽，如林缘或中等密度植被带，以增强隐蔽性，同时避免影响通信设施部署。与居民区之间的缓冲距离通常控制在300-600米，在安全与通信效率之间取得平衡。",
        metadata: &[("unit", "指挥单位"), ("type", "deployment_rule")],
    },
    Seed {
        text: "无人机侦察控制单元适合部署在中高高程区域，坡度应较小，确保设备稳定运行。植被条件宜为低矮或间断分布，避免高大植被干扰起降、信号与视距。与居民区保持400-800米缓冲距离，避免电磁与安全干扰。",
        metadata: &[("unit", "无人机侦察控制单元"), ("type", "deployment_rule")],
    },
];

/// 装备信息（equipment 集合，含射程）
const EQUIPMENT_INFO: &[Seed] = &[
    Seed {
        text: "轻步兵主要装备突击步枪，有效射程300-400米，最大射程800米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "轻步兵"), ("type", "equipment_info"), ("range", "300-400"), ("max_range", "800")],
    },
    Seed {
        text: "重装步兵主要装备重型机枪，有效射程400-500米，最大射程1000米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "重装步兵"), ("type", "equipment_info"), ("range", "400-500"), ("max_range", "1000")],
    },
    Seed {
        text: "机械化步兵主要装备轻型坦克，有效射程500-600米，最大射程1200米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "机械化步兵"), ("type", "equipment_info"), ("range", "500-600"), ("max_range", "1200")],
    },
    Seed {
        text: "坦克部队主要装备重型坦克，有效射程600-700米，最大射程1500米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "坦克部队"), ("type", "equipment_info"), ("range", "600-700"), ("max_range", "1500")],
    },
    Seed {
        text: "反坦克步兵主要装备反坦克导弹，有效射程700-800米，最大射程1800米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "反坦克步兵"), ("type", "equipment_info"), ("range", "700-800"), ("max_range", "1800")],
    },
    Seed {
        text: "自行火炮主要装备自行火炮，有效射程800-900米，最大射程2000米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "自行火炮"), ("type", "equipment_info"), ("range", "800-900"), ("max_range", "2000")],
    },
    Seed {
        text: "牵引火炮主要装备牵引火炮，有效射程900-1000米，最大射程2200米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "牵引火炮"), ("type", "equipment_info"), ("range", "900-1000"), ("max_range", "2200")],
    },
    Seed {
        text: "防空部队主要装备防空导弹，有效射程1000-1100米，最大射程2400米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "防空部队"), ("type", "equipment_info"), ("range", "1000-1100"), ("max_range", "2400")],
    },
    Seed {
        text: "狙击手主要装备狙击步枪，有效射程1100-1200米，最大射程2600米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "狙击手"), ("type", "equipment_info"), ("range", "1100-1200"), ("max_range", "2600")],
    },
    Seed {
        text: "特种部队主要装备特种武器，有效射程1200-1300米，最大射程2800米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "特种部队"), ("type", "equipment_info"), ("range", "1200-1300"), ("max_range", "2800")],
    },
    Seed {
        text: "装甲侦察单位主要装备装甲侦察车，有效射程1300-1400米，最大射程3000米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "装甲侦察单位"), ("type", "equipment_info"), ("range", "1300-1400"), ("max_range", "3000")],
    },
    Seed {
        text: "工兵部队主要装备工兵装备，有效射程1400-1500米，最大射程3200米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "工兵部队"), ("type", "equipment_info"), ("range", "1400-1500"), ("max_range", "3200")],
    },
    Seed {
        text: "后勤保障部队主要装备后勤保障装备，有效射程1500-1600米，最大射程3400米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "后勤保障部队"), ("type", "equipment_info"), ("range", "1500-1600"), ("max_range", "3400")],
    },
    Seed {
        text: "指挥单位主要装备指挥装备，有效射程1600-1700米，最大射程3600米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "指挥单位"), ("type", "equipment_info"), ("range", "1600-1700"), ("max_range", "3600")],
    },
    Seed {
        text: "无人机侦察控制单元主要装备无人机侦察控制装备，有效射程1700-1800米，最大射程3800米。在规划缓冲区距离时，应考虑射程因素以确保火力覆盖范围。",
        metadata: &[("unit", "无人机侦察控制单元"), ("type", "equipment_info"), ("range", "1700-1800"), ("max_range", "3800")],
    },
];

/// 执行历史样例（首次启动时给 think 阶段一些可检索的先例）
const SAMPLE_EXECUTIONS: &[Seed] = &[
    Seed {
        text: "使用buffer_filter_tool，设置buffer_distance为500米，成功筛选出空地区域",
        metadata: &[("tool", "buffer_filter_tool"), ("success", "true")],
    },
    Seed {
        text: "使用elevation_filter_tool，设置min_elev为100，max_elev为500，成功筛选出符合高程要求的区域",
        metadata: &[("tool", "elevation_filter_tool"), ("success", "true")],
    },
    Seed {
        text: "先使用buffer_filter_tool筛选空地，然后使用elevation_filter_tool进一步筛选高程",
        metadata: &[("tool", "chain"), ("success", "true")],
    },
    Seed {
        text: "使用vegetation_filter_tool，设置vegetation_types为[\"草地\", \"裸地\"]，成功筛选出符合植被要求的区域",
        metadata: &[("tool", "vegetation_filter_tool"), ("success", "true")],
    },
];

async fn seed_if_missing(
    store: &dyn KnowledgeStore,
    embedder: &dyn Embedder,
    collection: &str,
    expected_type: Option<&str>,
    seeds: &[Seed],
) -> Result<usize, AgentError> {
    let existing = store.list_all(collection).await?;
    let has_expected = match expected_type {
        Some(ty) => existing
            .iter()
            .any(|e| e.metadata.get("type").map(String::as_str) == Some(ty)),
        None => !existing.is_empty(),
    };
    if has_expected {
        return Ok(0);
    }
    // 旧格式数据整体清除后重建
    for entry in &existing {
        store.delete(collection, &entry.id).await?;
    }

    let mut inserted = 0;
    for seed in seeds {
        let vector = embedder.embed_passage(seed.text).await?;
        let entry = KnowledgeEntry::new(seed.text, seed.metadata_map(), vector);
        store.insert(collection, entry).await?;
        inserted += 1;
    }
    Ok(inserted)
}

/// 初始化内置集合（幂等）
pub async fn seed_collections(
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
) -> Result<(), AgentError> {
    let n = seed_if_missing(
        store.as_ref(),
        embedder.as_ref(),
        COLLECTION_KNOWLEDGE,
        Some("deployment_rule"),
        DEPLOYMENT_RULES,
    )
    .await?;
    if n > 0 {
        tracing::info!(count = n, "initialized deployment rules");
    }

    let n = seed_if_missing(
        store.as_ref(),
        embedder.as_ref(),
        COLLECTION_EQUIPMENT,
        Some("equipment_info"),
        EQUIPMENT_INFO,
    )
    .await?;
    if n > 0 {
        tracing::info!(count = n, "initialized equipment info");
    }

    let n = seed_if_missing(
        store.as_ref(),
        embedder.as_ref(),
        COLLECTION_EXECUTIONS,
        None,
        SAMPLE_EXECUTIONS,
    )
    .await?;
    if n > 0 {
        tracing::info!(count = n, "initialized sample executions");
    }
    Ok(())
}
