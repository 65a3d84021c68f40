/// Extra ingredients offered to the user after a first estimate.
pub const EXTRA_OPTIONS: [&str; 5] = ["Butter", "Oil", "Cheese", "Sauce", "Dressing"];

const INSTRUCTION: &str = "Look at this food photo. Identify the food items and estimate total calories. ";
const FORMAT_CONTRACT: &str = "Respond ONLY with JSON, no other text: \
     {\"food\": \"name\", \"calories\": N, \"protein_g\": N, \"carbs_g\": N, \"fat_g\": N}";

/// Builds the instruction sent alongside the photo.
///
/// Extras are listed in the given order and the model is asked to fold them
/// into the estimate. No trailing clause is added when there are none.
pub fn build_prompt(extras: &[String]) -> String {
    let mut prompt = String::with_capacity(256);
    prompt.push_str(INSTRUCTION);
    prompt.push_str(FORMAT_CONTRACT);

    if !extras.is_empty() {
        prompt.push_str(&format!(
            " The food also contains: {}. Adjust the calorie and macro estimates accordingly.",
            extras.join(", ")
        ));
    }

    prompt
}
