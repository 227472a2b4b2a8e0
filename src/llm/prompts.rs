use crate::aliases::AliasCatalog;

pub const SYSTEM_PROMPT_INTENT: &str = r#"
당신은 증권사 대표주관 리그테이블 질문을 분석하는 도우미입니다.

## 임무
사용자의 질문을 읽고 아래 항목을 JSON 객체 하나로 정리하세요.

- years: 질문이 가리키는 연도 목록 (예: "2021~2023년" → [2021, 2022, 2023])
- product: 상품 코드 목록 (아래 상품 목록 참고)
- company: 질문에 나온 증권사 이름, 질문에 적힌 그대로
- columns: 요청한 항목. 금액, 건수, 점유율, 순위 중 하나 이상
- top_n: "상위 N개" 형태일 때의 N (해당 없으면 생략)
- rank_range: "A~B위" 형태일 때의 [A, B] (해당 없으면 생략)
- is_chart: 그래프나 차트를 원하면 true
- is_compare: 연도 간 비교(비교, 상승, 하락, 순위가 오른)면 true

## 규칙
- 질문에 없는 값을 추측하지 마세요. 모르면 빈 목록이나 false를 쓰세요.
- top_n과 rank_range는 동시에 쓰지 마세요.
- JSON 외의 설명은 출력하지 마세요.
"#;

/// System prompt with the configured products and organizations appended, so
/// the model sees the same vocabulary the resolver accepts.
pub fn build_intent_prompt(catalog: &AliasCatalog) -> String {
    let mut prompt = String::from(SYSTEM_PROMPT_INTENT);

    prompt.push_str("\n## 상품 목록\n");
    for product in catalog.products() {
        prompt.push_str(&format!(
            "- {} ({}): {}\n",
            product.code,
            product.display_name,
            product.keywords.join(", ")
        ));
    }

    prompt.push_str("\n## 증권사 목록\n");
    for org in catalog.organizations() {
        if org.aliases.is_empty() {
            prompt.push_str(&format!("- {}\n", org.name));
        } else {
            prompt.push_str(&format!("- {} (별칭: {})\n", org.name, org.aliases.join(", ")));
        }
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogConfig;

    #[test]
    fn test_prompt_lists_catalog() {
        let catalog = AliasCatalog::from_config(&CatalogConfig::default()).unwrap();
        let prompt = build_intent_prompt(&catalog);
        assert!(prompt.contains("- DCM (국내채권)"));
        assert!(prompt.contains("- 대신증권\n"));
        assert!(prompt.contains("신한금투"));
    }
}
