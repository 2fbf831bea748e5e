use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageTemplate {
    WorkoutReminder,
    CheckReminder,
    NutritionReminder,
    Motivation,
    Custom,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateView {
    pub key: MessageTemplate,
    pub title: &'static str,
    pub body: &'static str,
}

impl MessageTemplate {
    pub const ALL: [MessageTemplate; 5] = [
        Self::WorkoutReminder,
        Self::CheckReminder,
        Self::NutritionReminder,
        Self::Motivation,
        Self::Custom,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Self::WorkoutReminder => "Time to train!",
            Self::CheckReminder => "Upload your check-in",
            Self::NutritionReminder => "Check your nutrition",
            Self::Motivation => "Keep it up!",
            Self::Custom => "",
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            Self::WorkoutReminder => "Don't forget to finish today's workout",
            Self::CheckReminder => {
                "A week has passed since your last check-in. Take your photos and log your progress"
            }
            Self::NutritionReminder => "Stick to your meal plan to reach your goals",
            Self::Motivation => "Every day is a step towards your goal. Don't give up!",
            Self::Custom => "",
        }
    }

    pub fn view(&self) -> TemplateView {
        TemplateView {
            key: *self,
            title: self.title(),
            body: self.body(),
        }
    }
}
